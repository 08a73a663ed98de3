//! Poll-until-settled wait loop.
//!
//! One lifecycle operation suspends here between polls until the remote
//! side effect becomes observable or a deadline expires. All four
//! lifecycle operations reuse [`wait_for_state`] with operation-specific
//! refresh functions and target states.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ReconcileError, Result};

/// Timing policy for one wait loop.
#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub initial_delay: Duration,
    pub poll_interval: Duration,
}

impl WaitPolicy {
    /// Topic creation settles quickly; keep the deadline short.
    pub fn create() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            initial_delay: Duration::from_secs(1),
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Deletion can be asynchronous on the remote side; allow minutes.
    pub fn delete() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            initial_delay: Duration::from_secs(3),
            poll_interval: Duration::from_secs(2),
        }
    }

    /// In-place updates (replication moves, partition adds).
    pub fn update() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            initial_delay: Duration::from_secs(1),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Repeatedly poll `refresh` until it reports a state in `targets`.
///
/// Suspends for `initial_delay` once, then `poll_interval` between polls.
/// A refresh error is immediately terminal: a definitive remote failure is
/// never polled past. Exceeding `policy.timeout` fails with
/// [`ReconcileError::Timeout`] carrying the last observed payload.
/// Cancelling `cancel` exits promptly with [`ReconcileError::Cancelled`],
/// whether the loop is sleeping or a poll is in flight.
pub async fn wait_for_state<S, F, Fut>(
    policy: WaitPolicy,
    targets: &[S],
    cancel: &CancellationToken,
    mut refresh: F,
) -> Result<(Value, S)>
where
    S: PartialEq + Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(Value, S)>>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut last_seen = Value::Null;
    let mut pause = policy.initial_delay;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(ReconcileError::Cancelled),
            _ = sleep(pause) => {}
        }

        let (payload, state) = tokio::select! {
            _ = cancel.cancelled() => return Err(ReconcileError::Cancelled),
            observed = refresh() => observed?,
        };
        debug!("poll observed state {:?}", state);

        if targets.contains(&state) {
            return Ok((payload, state));
        }
        last_seen = payload;

        if Instant::now() >= deadline {
            return Err(ReconcileError::Timeout {
                elapsed: started.elapsed(),
                target: format!("{:?}", targets),
                last_seen: last_seen.to_string(),
            });
        }
        pause = policy.poll_interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy() -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_secs(10),
            initial_delay: Duration::from_secs(1),
            poll_interval: Duration::from_secs(2),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn settles_after_pending_polls() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&polls);
        let cancel = CancellationToken::new();

        let (payload, state) = wait_for_state(quick_policy(), &["created"], &cancel, || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= 3 {
                    Ok((json!({"poll": n}), "created"))
                } else {
                    Ok((json!({"poll": n}), "pending"))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(state, "created");
        assert_eq!(payload, json!({"poll": 3}));
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_at_or_after_deadline() {
        let policy = quick_policy();
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let err = wait_for_state(policy, &["created"], &cancel, || async {
            Ok((json!("still waiting"), "pending"))
        })
        .await
        .unwrap_err();

        assert!(started.elapsed() >= policy.timeout);
        match err {
            ReconcileError::Timeout { last_seen, .. } => {
                assert!(last_seen.contains("still waiting"));
            }
            other => panic!("expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn remote_failure_is_terminal() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&polls);
        let cancel = CancellationToken::new();

        let err = wait_for_state(quick_policy(), &["created"], &cancel, || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(Value, &str), _>(ReconcileError::RemoteOperation {
                    detail: "broker rejected the request".to_string(),
                })
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ReconcileError::RemoteOperation { .. }));
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_exits_promptly() {
        let cancel = CancellationToken::new();
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                wait_for_state(quick_policy(), &["created"], &cancel, || async {
                    Ok((Value::Null, "pending"))
                })
                .await
            })
        };

        tokio::time::sleep(Duration::from_secs(2)).await;
        cancel.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(ReconcileError::Cancelled)));
    }
}
