//! Polling a stack until its replicas converge.

use async_io::Timer;
use futures::future::{AbortHandle, abortable};
use orchestrator_gateway::{Orchestrator, ReplicaState};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default pause between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How a wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Every replica of every matching service is running
    Ready,
    /// The budget elapsed first
    TimedOut {
        /// Replica states seen on the last successful poll
        last_seen: Vec<ReplicaState>,
    },
    /// The wait was aborted by its caller
    Cancelled,
}

impl Readiness {
    /// Whether the stack converged
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// Polls replica state through the orchestrator
#[derive(Clone)]
pub struct ReadinessPoller {
    orchestrator: Arc<dyn Orchestrator>,
    interval: Duration,
}

impl ReadinessPoller {
    /// Poller sleeping `interval` between polls
    pub fn new(orchestrator: Arc<dyn Orchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Poll until every service under `prefix` has converged or `timeout` elapses
    ///
    /// A prefix with no services yet counts as not ready. Poll errors are
    /// treated like an unconverged poll.
    pub async fn wait(&self, prefix: &str, timeout: Duration) -> Readiness {
        let deadline = Instant::now() + timeout;
        let mut last_seen = Vec::new();
        loop {
            match self.orchestrator.replica_states(prefix).await {
                Ok(states) if !states.is_empty() && states.iter().all(ReplicaState::is_converged) => {
                    debug!(prefix, "replicas converged");
                    return Readiness::Ready;
                }
                Ok(states) => last_seen = states,
                Err(e) => debug!(prefix, error = %e, "replica poll failed"),
            }

            let now = Instant::now();
            if now >= deadline {
                return Readiness::TimedOut { last_seen };
            }
            Timer::after(self.interval.min(deadline - now)).await;
        }
    }

    /// Like [`ReadinessPoller::wait`], but abortable through the returned handle
    pub fn wait_cancellable<'a>(
        &'a self,
        prefix: &'a str,
        timeout: Duration,
    ) -> (impl Future<Output = Readiness> + Send + 'a, AbortHandle) {
        let (wait, handle) = abortable(self.wait(prefix, timeout));
        (
            async move { wait.await.unwrap_or(Readiness::Cancelled) },
            handle,
        )
    }
}
