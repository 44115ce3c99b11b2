//! Tunables for the preview pipeline.

use tracing::warn;

/// User agent sent with every preview request. Some image hosts refuse
/// requests that do not look like they come from a browser.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:77.0) Gecko/20100101 Firefox/77.0";

/// Default number of fetch worker threads.
pub const DEFAULT_WORKERS: usize = 2;

/// Maximum number of fetch worker threads.
pub const MAX_WORKERS: usize = 4;

/// Largest share of either host dimension a preview may cover.
pub const DEFAULT_FIT_FRACTION: f64 = 0.8;

/// Pointer travel (in device units) inside the popup that dismisses it.
pub const DEFAULT_DISMISS_DISTANCE: f64 = 30.0;

#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Value of the `User-Agent` request header.
    pub user_agent: String,
    /// Fetch worker count, clamped to `1..=MAX_WORKERS` by the pool.
    pub workers: usize,
    /// Fraction of the host window the popup may occupy (default: 0.8)
    pub fit_fraction: f64,
    /// Straight-line pointer displacement that dismisses the popup (default: 30)
    pub dismiss_distance: f64,
    /// Accepted target suffixes, including the dot. Compared case-insensitively.
    pub extensions: Vec<String>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            workers: DEFAULT_WORKERS,
            fit_fraction: DEFAULT_FIT_FRACTION,
            dismiss_distance: DEFAULT_DISMISS_DISTANCE,
            extensions: vec![".jpg".to_string(), ".png".to_string()],
        }
    }
}

impl PreviewConfig {
    /// Defaults with `IMGPEEK_USER_AGENT` and `IMGPEEK_WORKERS` applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(agent) = std::env::var("IMGPEEK_USER_AGENT")
            .ok()
            .filter(|v| !v.trim().is_empty())
        {
            config.user_agent = agent;
        }
        if let Ok(raw) = std::env::var("IMGPEEK_WORKERS") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.workers = n,
                _ => warn!(value = %raw, "Ignoring invalid IMGPEEK_WORKERS"),
            }
        }
        config
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_fit_fraction(mut self, fraction: f64) -> Self {
        self.fit_fraction = fraction;
        self
    }

    pub fn with_dismiss_distance(mut self, distance: f64) -> Self {
        self.dismiss_distance = distance;
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }
}
