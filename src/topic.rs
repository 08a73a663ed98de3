//! Canonical topic model and desired-state conversion.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};

/// Canonical representation of a managed topic.
///
/// Two topics are equal only if name, partition count, replication factor
/// and the full config map match. A key that is absent on one side is not
/// the same as a key set to an empty string on the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub partitions: u32,
    pub replication_factor: u16,
    /// Per-topic config entries. A `None` value means the key is
    /// explicitly unset on the remote side.
    #[serde(default)]
    pub config: HashMap<String, Option<String>>,
}

/// Host-supplied desired state for a topic.
///
/// Field widths are deliberately loose; values are validated once when
/// converted into a [`Topic`] at the boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesiredTopic {
    pub name: String,
    pub partitions: i64,
    pub replication_factor: i64,
    #[serde(default)]
    pub config: HashMap<String, Option<String>>,
}

impl Topic {
    /// Build a canonical topic from desired state.
    ///
    /// Pure conversion; fails when the partition count or replication
    /// factor is below 1 or out of range.
    pub fn from_desired(desired: &DesiredTopic) -> Result<Self> {
        if desired.name.is_empty() {
            return Err(ReconcileError::Validation("name must not be empty".into()));
        }
        if desired.partitions < 1 {
            return Err(ReconcileError::Validation(format!(
                "partitions must be at least 1, got {}",
                desired.partitions
            )));
        }
        if desired.replication_factor < 1 {
            return Err(ReconcileError::Validation(format!(
                "replication_factor must be at least 1, got {}",
                desired.replication_factor
            )));
        }
        let partitions = u32::try_from(desired.partitions).map_err(|_| {
            ReconcileError::Validation(format!("partitions out of range: {}", desired.partitions))
        })?;
        let replication_factor = u16::try_from(desired.replication_factor).map_err(|_| {
            ReconcileError::Validation(format!(
                "replication_factor out of range: {}",
                desired.replication_factor
            ))
        })?;

        Ok(Self {
            name: desired.name.clone(),
            partitions,
            replication_factor,
            config: desired.config.clone(),
        })
    }
}

impl From<&Topic> for DesiredTopic {
    fn from(topic: &Topic) -> Self {
        Self {
            name: topic.name.clone(),
            partitions: i64::from(topic.partitions),
            replication_factor: i64::from(topic.replication_factor),
            config: topic.config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desired(name: &str, partitions: i64, rf: i64) -> DesiredTopic {
        DesiredTopic {
            name: name.to_string(),
            partitions,
            replication_factor: rf,
            config: HashMap::new(),
        }
    }

    #[test]
    fn from_desired_accepts_valid_state() {
        let topic = Topic::from_desired(&desired("orders", 3, 2)).unwrap();
        assert_eq!(topic.name, "orders");
        assert_eq!(topic.partitions, 3);
        assert_eq!(topic.replication_factor, 2);
    }

    #[test]
    fn from_desired_rejects_bad_counts() {
        assert!(matches!(
            Topic::from_desired(&desired("orders", 0, 2)),
            Err(ReconcileError::Validation(_))
        ));
        assert!(matches!(
            Topic::from_desired(&desired("orders", 3, 0)),
            Err(ReconcileError::Validation(_))
        ));
        assert!(matches!(
            Topic::from_desired(&desired("orders", 3, -1)),
            Err(ReconcileError::Validation(_))
        ));
        // replication_factor wider than its canonical width
        assert!(matches!(
            Topic::from_desired(&desired("orders", 3, 100_000)),
            Err(ReconcileError::Validation(_))
        ));
    }

    #[test]
    fn from_desired_is_idempotent_through_rederivation() {
        let mut d = desired("orders", 6, 3);
        d.config
            .insert("retention.ms".to_string(), Some("86400000".to_string()));

        let topic = Topic::from_desired(&d).unwrap();
        let rederived = Topic::from_desired(&DesiredTopic::from(&topic)).unwrap();
        assert_eq!(topic, rederived);
    }

    #[test]
    fn equality_is_reflexive_and_symmetric() {
        let a = Topic::from_desired(&desired("orders", 3, 2)).unwrap();
        let b = a.clone();
        assert_eq!(a, a);
        assert_eq!(a, b);
        assert_eq!(b, a);
    }

    #[test]
    fn missing_config_key_differs_from_empty_value() {
        let base = Topic::from_desired(&desired("orders", 3, 2)).unwrap();

        let mut with_empty = base.clone();
        with_empty
            .config
            .insert("cleanup.policy".to_string(), Some(String::new()));
        assert_ne!(base, with_empty);

        let mut with_unset = base.clone();
        with_unset.config.insert("cleanup.policy".to_string(), None);
        assert_ne!(base, with_unset);
        assert_ne!(with_empty, with_unset);
    }
}
