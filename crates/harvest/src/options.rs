// ABOUTME: Engine-wide configuration for page harvesting: polling cadence, pacing, and HTTP settings.
// ABOUTME: EngineBuilder provides a fluent API for constructing Engine instances with custom settings.

use std::collections::HashMap;
use std::time::Duration;

use crate::engine::poller::Pacing;
use crate::Engine;

/// Default cadence at which readiness predicates are re-evaluated.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Default pause after a readiness predicate first holds.
pub const DEFAULT_STABILIZATION: Duration = Duration::from_millis(500);

/// Configuration options shared by every extraction an engine runs.
///
/// Per-invocation knobs (`maxRecords`, `waitForLoad`, ...) live in each site's
/// parameter struct instead.
#[derive(Debug, Clone)]
pub struct Options {
    pub poll_interval: Duration,
    pub stabilization: Duration,
    pub pacing: Pacing,
    pub http_timeout: Duration,
    pub user_agent: String,
    pub allow_private_networks: bool,
    pub headers: HashMap<String, String>,
    pub http_client: Option<reqwest::Client>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            stabilization: DEFAULT_STABILIZATION,
            pacing: Pacing::off(),
            http_timeout: Duration::from_secs(30),
            user_agent: "Harvest/1.0".to_string(),
            allow_private_networks: false,
            headers: HashMap::new(),
            http_client: None,
        }
    }
}

/// Builder for constructing Engine instances with custom configuration.
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    opts: Options,
}

impl EngineBuilder {
    /// Create a new EngineBuilder with default options.
    pub fn new() -> Self {
        Self {
            opts: Options::default(),
        }
    }

    /// Set how often readiness predicates are re-evaluated.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.opts.poll_interval = interval;
        self
    }

    /// Set the pause taken once a page reports ready.
    pub fn stabilization(mut self, pause: Duration) -> Self {
        self.opts.stabilization = pause;
        self
    }

    /// Set the pause inserted between extraction stages.
    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.opts.pacing = pacing;
        self
    }

    /// Set the HTTP request timeout used by fetched pages.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.opts.http_timeout = timeout;
        self
    }

    /// Set the User-Agent header for fetched pages.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.opts.user_agent = user_agent.into();
        self
    }

    /// Allow or disallow fetching pages from private networks.
    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.opts.allow_private_networks = allow;
        self
    }

    /// Add a custom header to every page fetch.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.headers.insert(key.into(), value.into());
        self
    }

    /// Use a custom HTTP client for fetched pages.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.opts.http_client = Some(client);
        self
    }

    /// Build the Engine with the configured options.
    pub fn build(self) -> Engine {
        Engine::new(self.opts)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_cadence() {
        let opts = Options::default();
        assert_eq!(opts.poll_interval, Duration::from_millis(200));
        assert_eq!(opts.stabilization, Duration::from_millis(500));
        assert!(opts.pacing.is_off());
        assert!(!opts.allow_private_networks);
    }

    #[test]
    fn builder_overrides_fields() {
        let engine = EngineBuilder::new()
            .poll_interval(Duration::from_millis(50))
            .stabilization(Duration::ZERO)
            .pacing(Pacing::between(Duration::from_millis(10), Duration::from_millis(20)))
            .user_agent("test-agent")
            .header("Accept-Language", "en")
            .allow_private_networks(true)
            .build();

        let opts = engine.options();
        assert_eq!(opts.poll_interval, Duration::from_millis(50));
        assert_eq!(opts.stabilization, Duration::ZERO);
        assert!(!opts.pacing.is_off());
        assert_eq!(opts.user_agent, "test-agent");
        assert_eq!(opts.headers.get("Accept-Language").map(String::as_str), Some("en"));
        assert!(opts.allow_private_networks);
    }
}
