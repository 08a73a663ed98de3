//! Remote operator invocation and outcome normalization.
//!
//! The remote operator (the component that actually creates, alters and
//! deletes topics on the cluster) is reachable only through a single
//! request/response exchange. The transport behind that exchange is not
//! this crate's concern; it lives behind the [`RemoteOperator`] trait.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::Result;

/// Connection settings for the remote operator, passed explicitly to the
/// invoker instead of living in ambient state.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Name of the remote function that executes topic operations.
    pub function_name: String,
    /// Region hint passed through to the transport.
    pub region: String,
    /// Bootstrap server of the cluster the operator manages.
    pub bootstrap_server: String,
}

/// Kinds of operations the remote operator can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    ListTopics,
    CreateTopic,
    ReadTopic,
    UpdateTopicConfig,
    AddPartitions,
    AlterReplicationFactor,
    DeleteTopic,
    DescribeCapabilities,
}

impl OperationKind {
    /// Wire discriminator understood by the remote operator.
    pub fn query(self) -> &'static str {
        match self {
            OperationKind::ListTopics => "listTopics",
            OperationKind::CreateTopic => "createTopic",
            OperationKind::ReadTopic => "readTopic",
            OperationKind::UpdateTopicConfig => "updateTopicConfig",
            OperationKind::AddPartitions => "addPartitions",
            OperationKind::AlterReplicationFactor => "alterReplicationFactor",
            OperationKind::DeleteTopic => "deleteTopic",
            OperationKind::DescribeCapabilities => "describeCapabilities",
        }
    }
}

/// Normalized result of one remote invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The operator returned a success status with a parseable body.
    Settled(Value),
    /// The response could not be interpreted yet. The poll engine may
    /// retry until its deadline; this is never promoted to `Settled`.
    Pending { note: String },
    /// The operator reported a definitive failure. `detail` carries the
    /// response body as diagnostic payload.
    Failed { status: u16, detail: String },
}

/// Transport used to reach the remote operator.
///
/// One call is one request/response exchange. Retries are the poll
/// engine's responsibility, so implementations must not retry internally.
#[async_trait]
pub trait RemoteOperator: Send + Sync {
    async fn call(&self, request: Vec<u8>) -> anyhow::Result<Vec<u8>>;
}

/// Response envelope produced by the remote operator's execution
/// environment.
#[derive(Debug, Deserialize)]
struct RemoteResponse {
    #[serde(rename = "statusCode")]
    status_code: u16,
    #[serde(default)]
    body: Value,
}

/// Stateless wrapper around a single request/response exchange with the
/// remote operator. Holds no per-call state, so one invoker can be shared
/// across concurrently reconciled topics.
#[derive(Clone)]
pub struct RemoteInvoker {
    operator: Arc<dyn RemoteOperator>,
    config: RemoteConfig,
}

impl RemoteInvoker {
    pub fn new(operator: Arc<dyn RemoteOperator>, config: RemoteConfig) -> Self {
        Self { operator, config }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Perform exactly one exchange with the remote operator.
    ///
    /// `params` are merged into the request's query parameters next to the
    /// operation discriminator. An unparseable response yields
    /// [`Outcome::Pending`]; an error status yields [`Outcome::Failed`].
    pub async fn invoke(&self, kind: OperationKind, params: Map<String, Value>) -> Result<Outcome> {
        let mut query = Map::new();
        query.insert("type_query".to_string(), json!(kind.query()));
        query.insert(
            "bootstrap_server".to_string(),
            json!(self.config.bootstrap_server),
        );
        query.extend(params);

        let request = json!({ "queryStringParameters": Value::Object(query) });
        let payload = serde_json::to_vec(&request)
            .map_err(|e| anyhow::anyhow!("encoding request for {}: {}", kind.query(), e))?;

        let raw = self.operator.call(payload).await?;
        debug!(
            "remote operator response for {}: {}",
            kind.query(),
            String::from_utf8_lossy(&raw)
        );

        let response: RemoteResponse = match serde_json::from_slice(&raw) {
            Ok(r) => r,
            Err(e) => {
                return Ok(Outcome::Pending {
                    note: format!("response for {} not parseable: {}", kind.query(), e),
                });
            }
        };

        if (200..300).contains(&response.status_code) {
            Ok(Outcome::Settled(response.body))
        } else {
            Ok(Outcome::Failed {
                status: response.status_code,
                detail: response.body.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct CannedOperator {
        response: Vec<u8>,
        requests: Mutex<Vec<Value>>,
    }

    impl CannedOperator {
        fn new(response: &str) -> Self {
            Self {
                response: response.as_bytes().to_vec(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RemoteOperator for CannedOperator {
        async fn call(&self, request: Vec<u8>) -> anyhow::Result<Vec<u8>> {
            let parsed: Value = serde_json::from_slice(&request)?;
            self.requests.lock().await.push(parsed);
            Ok(self.response.clone())
        }
    }

    fn invoker(operator: Arc<CannedOperator>) -> RemoteInvoker {
        RemoteInvoker::new(
            operator,
            RemoteConfig {
                function_name: "topic-operator".to_string(),
                region: "us-east-1".to_string(),
                bootstrap_server: "broker-1:9092".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn success_status_with_body_settles() {
        let operator = Arc::new(CannedOperator::new(r#"{"statusCode":200,"body":{"ok":true}}"#));
        let outcome = invoker(operator)
            .invoke(OperationKind::CreateTopic, Map::new())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Settled(json!({"ok": true})));
    }

    #[tokio::test]
    async fn error_status_fails_with_body_detail() {
        let operator = Arc::new(CannedOperator::new(
            r#"{"statusCode":500,"body":"broker unavailable"}"#,
        ));
        let outcome = invoker(operator)
            .invoke(OperationKind::DeleteTopic, Map::new())
            .await
            .unwrap();
        match outcome {
            Outcome::Failed { status, detail } => {
                assert_eq!(status, 500);
                assert!(detail.contains("broker unavailable"));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unparseable_response_stays_pending() {
        let operator = Arc::new(CannedOperator::new("not json"));
        let outcome = invoker(operator)
            .invoke(OperationKind::ReadTopic, Map::new())
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Pending { .. }));
    }

    #[tokio::test]
    async fn request_carries_discriminator_and_bootstrap_server() {
        let operator = Arc::new(CannedOperator::new(r#"{"statusCode":200,"body":null}"#));
        let mut params = Map::new();
        params.insert("name".to_string(), json!("orders"));
        invoker(Arc::clone(&operator))
            .invoke(OperationKind::ReadTopic, params)
            .await
            .unwrap();

        let requests = operator.requests.lock().await;
        let query = &requests[0]["queryStringParameters"];
        assert_eq!(query["type_query"], json!("readTopic"));
        assert_eq!(query["bootstrap_server"], json!("broker-1:9092"));
        assert_eq!(query["name"], json!("orders"));
    }
}
