use crate::{
    report::{event::ErrorEvent, sink::EventSink},
    utils::{
        from_env::{EnvItemInfo, FromEnv, FromEnvErr, FromEnvVar},
        identity::ServiceIdentity,
    },
};
use metrics::counter;
use std::{num::ParseIntError, sync::Arc, time::Duration};
use tokio::sync::mpsc;

// Environment variable names for configuration
const QUEUE_CAPACITY: &str = "ERRLIGHT_QUEUE_CAPACITY";
const SUBMIT_TIMEOUT_MS: &str = "ERRLIGHT_SUBMIT_TIMEOUT_MS";

const DEFAULT_QUEUE_CAPACITY: usize = 256;
const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Configuration for the background reporter.
///
/// The env vars it checks are:
/// - `ERRLIGHT_QUEUE_CAPACITY` - optional. Capacity of the bounded event
///   queue. Events arriving while the queue is full are dropped. Defaults to
///   256.
/// - `ERRLIGHT_SUBMIT_TIMEOUT_MS` - optional. Upper bound on a single sink
///   submission, in milliseconds. Defaults to 1000ms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReporterConfig {
    queue_capacity: usize,
    submit_timeout: Duration,
}

impl ReporterConfig {
    /// Creates a new `ReporterConfig` from the given parts. A zero capacity
    /// is bumped to 1.
    pub fn new(queue_capacity: usize, submit_timeout: Duration) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
            submit_timeout,
        }
    }

    /// Capacity of the bounded event queue.
    pub const fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Upper bound on a single sink submission.
    pub const fn submit_timeout(&self) -> Duration {
        self.submit_timeout
    }
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, DEFAULT_SUBMIT_TIMEOUT)
    }
}

impl FromEnv for ReporterConfig {
    type Error = ParseIntError;

    fn inventory() -> Vec<&'static EnvItemInfo> {
        vec![
            &EnvItemInfo {
                var: QUEUE_CAPACITY,
                description: "Capacity of the bounded error-event queue, a usize. Defaults to 256.",
                optional: true,
            },
            &EnvItemInfo {
                var: SUBMIT_TIMEOUT_MS,
                description: "Timeout for a single telemetry submission in milliseconds, a u64. Defaults to 1000.",
                optional: true,
            },
        ]
    }

    fn from_env() -> Result<Self, FromEnvErr<Self::Error>> {
        let queue_capacity =
            Option::<usize>::from_env_var(QUEUE_CAPACITY)?.unwrap_or(DEFAULT_QUEUE_CAPACITY);
        let submit_timeout =
            Option::<Duration>::from_env_var(SUBMIT_TIMEOUT_MS)?.unwrap_or(DEFAULT_SUBMIT_TIMEOUT);

        Ok(Self::new(queue_capacity, submit_timeout))
    }
}

/// Process-wide handle for submitting error events, fire-and-forget.
///
/// Cheap to clone; all clones feed the same bounded queue, drained by a
/// single background task. [`Reporter::report`] never blocks and never
/// fails: when the queue is full the event is dropped and counted. The
/// worker exits once every handle has been dropped, without waiting on
/// in-flight submissions.
#[derive(Debug, Clone)]
pub struct Reporter {
    identity: ServiceIdentity,
    tx: mpsc::Sender<ErrorEvent>,
}

impl Reporter {
    /// Spawn the background submission task and return a handle to it. Must
    /// be called within a tokio runtime.
    ///
    /// Every event reported through the handle is tagged with `identity`
    /// before submission.
    pub fn spawn(
        identity: ServiceIdentity,
        sink: Arc<dyn EventSink>,
        config: ReporterConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity());
        tokio::spawn(run_worker(sink, rx, config.submit_timeout()));

        Self { identity, tx }
    }

    /// Queue one event for submission. Non-blocking; drops the event when
    /// the queue is full.
    pub fn report(&self, event: ErrorEvent) {
        let event = event.tagged(&self.identity);
        match self.tx.try_send(event) {
            Ok(()) => {
                counter!("errlight_events_queued_total").increment(1);
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                counter!("errlight_events_dropped_total").increment(1);
                tracing::warn!(
                    kind = event.kind(),
                    route = event.request().route(),
                    "error-event queue full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("reporter worker has shut down, dropping event");
            }
        }
    }

    /// Identity stamped onto every reported event.
    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }
}

async fn run_worker(
    sink: Arc<dyn EventSink>,
    mut rx: mpsc::Receiver<ErrorEvent>,
    submit_timeout: Duration,
) {
    while let Some(event) = rx.recv().await {
        match tokio::time::timeout(submit_timeout, sink.submit(event)).await {
            Ok(Ok(())) => {
                counter!("errlight_events_submitted_total").increment(1);
            }
            Ok(Err(err)) => {
                counter!("errlight_submit_failures_total").increment(1);
                tracing::warn!(%err, "failed to submit error event");
            }
            Err(_) => {
                counter!("errlight_submit_timeouts_total").increment(1);
                tracing::warn!(
                    timeout_ms = submit_timeout.as_millis() as u64,
                    "error-event submission timed out"
                );
            }
        }
    }
}
