//! Topic lifecycle operations against the remote operator.
//!
//! Each operation drives one desired-state transition: invoke the remote
//! operator, then wait until the side effect is observable through reads.
//! Change classification ([`TopicReconciler::classify`]) decides, before an
//! update is attempted, which attribute changes can be applied in place and
//! which force a destroy-and-recreate.

use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ReconcileError, Result};
use crate::invoker::{OperationKind, Outcome, RemoteInvoker};
use crate::poll::{WaitPolicy, wait_for_state};
use crate::topic::{DesiredTopic, Topic};

/// Status the remote operator uses to signal that a topic does not exist.
const STATUS_NOT_FOUND: u16 = 404;

/// Observable states of a topic on the remote side, as seen through reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicState {
    /// The side effect is not observable yet.
    Pending,
    /// The topic exists (creation settled).
    Created,
    /// The topic's attributes match the update target.
    Converged,
    /// The topic is observably absent.
    Deleted,
}

/// Per-field replace decisions computed from an old/new desired-state pair
/// before an update is attempted. A `true` field cannot be changed in
/// place and forces destroy-and-recreate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangePlan {
    pub name_forces_replace: bool,
    pub partitions_force_replace: bool,
    pub replication_factor_forces_replace: bool,
}

impl ChangePlan {
    /// True if any changed field requires replacing the topic.
    pub fn forces_replace(&self) -> bool {
        self.name_forces_replace
            || self.partitions_force_replace
            || self.replication_factor_forces_replace
    }
}

/// Reconciles one topic's desired state with the remote operator.
///
/// The invoker is stateless, so one reconciler can serve many topics as
/// long as the host serializes operations per topic id.
pub struct TopicReconciler {
    invoker: RemoteInvoker,
}

impl TopicReconciler {
    pub fn new(invoker: RemoteInvoker) -> Self {
        Self { invoker }
    }

    /// Create the topic and wait until it is observable.
    ///
    /// Returns the topic name as the host-visible id. On any error nothing
    /// should be persisted, except [`ReconcileError::Cancelled`]: the
    /// remote side effect may already have happened, so a cancelled create
    /// leaves the topic in an unknown state rather than "does not exist".
    pub async fn create(&self, desired: &DesiredTopic, cancel: &CancellationToken) -> Result<String> {
        let topic = Topic::from_desired(desired)?;
        info!(
            "Creating topic {} (partitions={}, replication_factor={})",
            topic.name, topic.partitions, topic.replication_factor
        );

        let mut params = name_params(&topic.name);
        params.insert("partitions".to_string(), json!(topic.partitions));
        params.insert(
            "replication_factor".to_string(),
            json!(topic.replication_factor),
        );
        params.insert("config".to_string(), json!(topic.config));

        // A Settled or not-yet-parseable outcome is confirmed through reads
        // either way; only a definitive failure stops here.
        if let Outcome::Failed { status, detail } =
            self.invoker.invoke(OperationKind::CreateTopic, params).await?
        {
            return Err(remote_failure("create", &topic.name, status, detail));
        }

        wait_for_state(WaitPolicy::create(), &[TopicState::Created], cancel, || {
            self.observe_present(&topic.name)
        })
        .await?;

        info!("Topic {} created", topic.name);
        Ok(topic.name.clone())
    }

    /// Read the topic by id.
    ///
    /// `Ok(None)` means the remote side reports the topic as gone; the
    /// host should clear its record. That is a valid terminal state, not
    /// an error.
    pub async fn read(&self, name: &str) -> Result<Option<Topic>> {
        match self
            .invoker
            .invoke(OperationKind::ReadTopic, name_params(name))
            .await?
        {
            Outcome::Settled(body) => Ok(Some(parse_topic(name, body)?)),
            Outcome::Failed { status, .. } if status == STATUS_NOT_FOUND => {
                debug!("Topic {} not found on remote", name);
                Ok(None)
            }
            Outcome::Failed { status, detail } => {
                Err(remote_failure("read", name, status, detail))
            }
            Outcome::Pending { note } => Err(ReconcileError::RemoteOperation {
                detail: format!("read of topic {} returned no usable response: {}", name, note),
            }),
        }
    }

    /// Apply in-place changes from `old` to `new`.
    ///
    /// The caller must have already run [`classify`](Self::classify) and
    /// replaced the topic instead if any field forced it. Sub-updates run
    /// in order (replication factor, partitions, config); the first failure
    /// aborts the remaining steps without rolling back, so partially
    /// applied state stays visible. Finishes with a fresh read.
    pub async fn update(
        &self,
        old: &DesiredTopic,
        new: &DesiredTopic,
        cancel: &CancellationToken,
    ) -> Result<Topic> {
        let target = Topic::from_desired(new)?;

        if old.replication_factor != new.replication_factor {
            info!(
                "Updating replication_factor of {} from {} to {}",
                target.name, old.replication_factor, new.replication_factor
            );
            let mut params = name_params(&target.name);
            params.insert(
                "replication_factor".to_string(),
                json!(target.replication_factor),
            );
            if let Outcome::Failed { status, detail } = self
                .invoker
                .invoke(OperationKind::AlterReplicationFactor, params)
                .await?
            {
                return Err(remote_failure("alter replication", &target.name, status, detail));
            }

            wait_for_state(WaitPolicy::update(), &[TopicState::Converged], cancel, || {
                self.observe_replication(&target.name, target.replication_factor)
            })
            .await?;
        }

        if old.partitions != new.partitions {
            info!(
                "Updating partitions of {} from {} to {}",
                target.name, old.partitions, new.partitions
            );
            let mut params = name_params(&target.name);
            params.insert("partitions".to_string(), json!(target.partitions));
            if let Outcome::Failed { status, detail } =
                self.invoker.invoke(OperationKind::AddPartitions, params).await?
            {
                return Err(remote_failure("add partitions", &target.name, status, detail));
            }

            wait_for_state(WaitPolicy::update(), &[TopicState::Converged], cancel, || {
                self.observe_partitions(&target.name, target.partitions)
            })
            .await?;
        }

        if old.config != new.config {
            info!("Updating config of {}", target.name);
            let mut params = name_params(&target.name);
            params.insert("config".to_string(), json!(target.config));
            match self
                .invoker
                .invoke(OperationKind::UpdateTopicConfig, params)
                .await?
            {
                Outcome::Settled(_) => {}
                Outcome::Failed { status, detail } => {
                    return Err(remote_failure("update config", &target.name, status, detail));
                }
                // No poll phase follows a config update; an unreadable
                // response cannot be confirmed and counts as a failure.
                Outcome::Pending { note } => {
                    return Err(ReconcileError::RemoteOperation {
                        detail: format!(
                            "config update of topic {} returned no usable response: {}",
                            target.name, note
                        ),
                    });
                }
            }
        }

        // Refresh host-visible state after all sub-updates.
        match self.read(&target.name).await? {
            Some(topic) => Ok(topic),
            None => Err(ReconcileError::NotFound(target.name.clone())),
        }
    }

    /// Delete the topic and wait until it is observably absent.
    pub async fn delete(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        info!("Deleting topic {}", name);

        match self
            .invoker
            .invoke(OperationKind::DeleteTopic, name_params(name))
            .await?
        {
            Outcome::Failed { status, .. } if status == STATUS_NOT_FOUND => {
                info!("Topic {} already absent", name);
                return Ok(());
            }
            Outcome::Failed { status, detail } => {
                return Err(remote_failure("delete", name, status, detail));
            }
            _ => {}
        }

        wait_for_state(WaitPolicy::delete(), &[TopicState::Deleted], cancel, || {
            self.observe_absent(name)
        })
        .await?;

        info!("Topic {} deleted", name);
        Ok(())
    }

    /// Classify an old/new desired-state change into in-place updates vs
    /// forced replacements.
    ///
    /// Pure function of the pair except for one capability probe when the
    /// replication factor changed: in-place replication changes are
    /// version-gated on the remote system.
    pub async fn classify(&self, old: &DesiredTopic, new: &DesiredTopic) -> Result<ChangePlan> {
        let mut plan = ChangePlan::default();

        if old.name != new.name {
            plan.name_forces_replace = true;
        }

        if new.partitions < old.partitions {
            info!(
                "Partitions decreased from {} to {}; forcing replacement",
                old.partitions, new.partitions
            );
            plan.partitions_force_replace = true;
        }

        if old.replication_factor != new.replication_factor
            && !self.can_alter_replication_factor().await?
        {
            info!("Remote does not support in-place replication factor changes; forcing replacement");
            plan.replication_factor_forces_replace = true;
        }

        Ok(plan)
    }

    /// List topic names known to the remote operator.
    pub async fn list(&self) -> Result<Vec<String>> {
        match self.invoker.invoke(OperationKind::ListTopics, Map::new()).await? {
            Outcome::Settled(body) => serde_json::from_value(body).map_err(|e| {
                ReconcileError::RemoteOperation {
                    detail: format!("unreadable topic list: {}", e),
                }
            }),
            Outcome::Failed { status, detail } => {
                Err(ReconcileError::RemoteOperation {
                    detail: format!("topic list failed with status {}: {}", status, detail),
                })
            }
            Outcome::Pending { note } => Err(ReconcileError::RemoteOperation {
                detail: format!("topic list returned no usable response: {}", note),
            }),
        }
    }

    /// Capability probe: can the remote system change a topic's
    /// replication factor in place?
    async fn can_alter_replication_factor(&self) -> Result<bool> {
        match self
            .invoker
            .invoke(OperationKind::DescribeCapabilities, Map::new())
            .await?
        {
            Outcome::Settled(body) => Ok(body
                .get("can_alter_replication_factor")
                .and_then(Value::as_bool)
                .unwrap_or(false)),
            Outcome::Failed { status, detail } => {
                Err(ReconcileError::RemoteOperation {
                    detail: format!("capability probe failed with status {}: {}", status, detail),
                })
            }
            // A garbled probe must not silently classify the change as
            // "unsupported": forcing replacement on bad data would destroy
            // a healthy topic.
            Outcome::Pending { note } => Err(ReconcileError::RemoteOperation {
                detail: format!("capability probe returned no usable response: {}", note),
            }),
        }
    }

    /// Poll refresh for create: the topic exists once a read settles.
    async fn observe_present(&self, name: &str) -> Result<(Value, TopicState)> {
        match self
            .invoker
            .invoke(OperationKind::ReadTopic, name_params(name))
            .await?
        {
            Outcome::Settled(body) => Ok((body, TopicState::Created)),
            Outcome::Failed { status, detail } if status == STATUS_NOT_FOUND => {
                Ok((json!(detail), TopicState::Pending))
            }
            Outcome::Failed { status, detail } => {
                Err(remote_failure("read", name, status, detail))
            }
            Outcome::Pending { note } => Ok((json!(note), TopicState::Pending)),
        }
    }

    /// Poll refresh for delete: done once a read reports the topic missing.
    async fn observe_absent(&self, name: &str) -> Result<(Value, TopicState)> {
        match self
            .invoker
            .invoke(OperationKind::ReadTopic, name_params(name))
            .await?
        {
            Outcome::Settled(body) => Ok((body, TopicState::Pending)),
            Outcome::Failed { status, detail } if status == STATUS_NOT_FOUND => {
                Ok((json!(detail), TopicState::Deleted))
            }
            Outcome::Failed { status, detail } => {
                Err(remote_failure("read", name, status, detail))
            }
            Outcome::Pending { note } => Ok((json!(note), TopicState::Pending)),
        }
    }

    /// Poll refresh for a replication factor change.
    async fn observe_replication(&self, name: &str, factor: u16) -> Result<(Value, TopicState)> {
        let (body, topic) = match self.observe_topic(name).await? {
            (body, Some(topic)) => (body, topic),
            (body, None) => return Ok((body, TopicState::Pending)),
        };
        if topic.replication_factor == factor {
            Ok((body, TopicState::Converged))
        } else {
            Ok((body, TopicState::Pending))
        }
    }

    /// Poll refresh for a partition count change.
    async fn observe_partitions(&self, name: &str, partitions: u32) -> Result<(Value, TopicState)> {
        let (body, topic) = match self.observe_topic(name).await? {
            (body, Some(topic)) => (body, topic),
            (body, None) => return Ok((body, TopicState::Pending)),
        };
        if topic.partitions == partitions {
            Ok((body, TopicState::Converged))
        } else {
            Ok((body, TopicState::Pending))
        }
    }

    /// One read during an update wait. A topic that vanished mid-update is
    /// a definitive failure, not something to keep polling for.
    async fn observe_topic(&self, name: &str) -> Result<(Value, Option<Topic>)> {
        match self
            .invoker
            .invoke(OperationKind::ReadTopic, name_params(name))
            .await?
        {
            Outcome::Settled(body) => {
                let topic = parse_topic(name, body.clone())?;
                Ok((body, Some(topic)))
            }
            Outcome::Failed { status, .. } if status == STATUS_NOT_FOUND => {
                Err(ReconcileError::NotFound(name.to_string()))
            }
            Outcome::Failed { status, detail } => {
                Err(remote_failure("read", name, status, detail))
            }
            Outcome::Pending { note } => Ok((json!(note), None)),
        }
    }
}

fn name_params(name: &str) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("name".to_string(), json!(name));
    params
}

fn parse_topic(name: &str, body: Value) -> Result<Topic> {
    serde_json::from_value(body).map_err(|e| ReconcileError::RemoteOperation {
        detail: format!("unreadable body for topic {}: {}", name, e),
    })
}

fn remote_failure(op: &str, name: &str, status: u16, detail: String) -> ReconcileError {
    ReconcileError::RemoteOperation {
        detail: format!("{} of topic {} failed with status {}: {}", op, name, status, detail),
    }
}
