// ABOUTME: Readiness polling over fresh page snapshots, plus randomized pacing between stages.
// ABOUTME: Timeouts are not failures: the caller proceeds with whatever the page rendered.

use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::options::Options;
use crate::page::{PageSource, Snapshot};

/// Outcome of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

/// Re-evaluates a predicate over fresh snapshots until it holds or time runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPoller {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub stabilization: Duration,
}

impl ReadinessPoller {
    pub fn new(timeout: Duration, poll_interval: Duration, stabilization: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
            stabilization,
        }
    }

    /// A poller with the engine's cadence and the given budget.
    pub fn with_options(timeout: Duration, opts: &Options) -> Self {
        Self::new(timeout, opts.poll_interval, opts.stabilization)
    }

    /// Waits until `ready` holds for a snapshot of `source`.
    ///
    /// The predicate is evaluated at least once. On success the poller pauses
    /// for the stabilization period before returning so progressively rendered
    /// content can settle. A snapshot that cannot be taken counts as not ready.
    pub async fn wait<P, F>(&self, source: &P, ready: F) -> Readiness
    where
        P: PageSource + ?Sized,
        F: Fn(&Snapshot) -> bool,
    {
        let deadline = Instant::now() + self.timeout;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let holds = match source.snapshot().await {
                Ok(snap) => ready(&snap),
                Err(err) => {
                    debug!(error = %err, "snapshot failed while polling");
                    false
                }
            };
            if holds {
                debug!(attempts, "page ready");
                sleep(self.stabilization).await;
                return Readiness::Ready;
            }
            if Instant::now() >= deadline {
                warn!(
                    url = %source.url(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "readiness timeout reached, continuing with current content"
                );
                return Readiness::TimedOut;
            }
            sleep(self.poll_interval).await;
        }
    }
}

/// Optional randomized pause between extraction stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    /// No pauses.
    pub fn off() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Pauses uniformly distributed in `[min, max]`. Bounds are swapped if reversed.
    pub fn between(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// The pacing the CLI enables with `--pace`.
    pub fn human() -> Self {
        Self::between(Duration::from_millis(400), Duration::from_millis(1200))
    }

    pub fn is_off(&self) -> bool {
        self.max.is_zero()
    }

    /// Sleeps for a random duration within the configured bounds.
    pub async fn pause(&self) {
        if self.is_off() {
            return;
        }
        let millis = {
            let lo = self.min.as_millis() as u64;
            let hi = self.max.as_millis() as u64;
            rand::thread_rng().gen_range(lo..=hi)
        };
        debug!(millis, "pacing pause");
        sleep(Duration::from_millis(millis)).await;
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::off()
    }
}
