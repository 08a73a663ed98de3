//! topic-reconciler: reconciles desired topic state with a remote topic
//! operator.
//!
//! The operator — the component that actually creates, alters and deletes
//! topics on the cluster — is reachable only through an asynchronous
//! request/response invocation that is not immediately consistent. This
//! crate:
//! - converts a host-supplied [`DesiredTopic`] into a canonical [`Topic`]
//! - drives create/read/update/delete through the [`RemoteInvoker`]
//! - waits for remote side effects to become observable via
//!   [`wait_for_state`]
//! - classifies old/new changes into in-place updates vs forced
//!   replacements ([`TopicReconciler::classify`])
//!
//! The host owns persistence (the topic id and last-read attributes) and
//! serializes lifecycle operations per topic id. The transport behind the
//! operator lives behind the [`RemoteOperator`] trait.

pub mod error;
pub mod invoker;
pub mod poll;
pub mod reconciler;
pub mod topic;

pub use error::{ReconcileError, Result};
pub use invoker::{OperationKind, Outcome, RemoteConfig, RemoteInvoker, RemoteOperator};
pub use poll::{WaitPolicy, wait_for_state};
pub use reconciler::{ChangePlan, TopicReconciler, TopicState};
pub use topic::{DesiredTopic, Topic};
