//! Client configuration.
//!
//! A single [`ClientConfig`] is assembled at startup (TOML file, then
//! environment overlay, then caller overrides), validated once, and shared
//! read-only as `Arc<ClientConfig>` with every component that needs it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AgentError, Result};
use crate::transport::Mode;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default endpoint of the reasoning service.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Environment variables consulted by [`ClientConfig::apply_env`].
const ENV_BASE_URL: &str = "TANDEM_BASE_URL";
const ENV_MODE: &str = "TANDEM_MODE";
const ENV_TIMEOUT_SECS: &str = "TANDEM_TIMEOUT_SECS";
const ENV_IMPLICIT_ACTIONS: &str = "TANDEM_IMPLICIT_ACTIONS";
const ENV_USER_MEMORY: &str = "TANDEM_USER_MEMORY";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Everything the turn pipeline reads from its environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the reasoning service (e.g. `http://localhost:8000`).
    pub base_url: String,

    /// Timeout for a single conversational request, in seconds.
    pub request_timeout_secs: u64,

    /// Timeout for planner and mode-selection requests, in seconds.
    pub planner_timeout_secs: u64,

    /// Total attempts per request, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,

    /// Upper bound for the retry delay, in milliseconds.
    pub max_backoff_ms: u64,

    /// Timeout for a single tool invocation, in seconds.
    pub tool_timeout_secs: u64,

    /// How many curated turns the remote planner sees.
    pub history_window: usize,

    /// Mode used when mode selection cannot decide.
    pub default_mode: Mode,

    /// Directory the tools operate in and the seed context describes.
    pub working_dir: PathBuf,

    /// Free-text notes about the user, folded into the seed context.
    pub user_memory: String,

    /// List the working directory one level deeper and without a cap.
    pub full_context: bool,

    /// Materialize fenced code blocks from conversational replies as files.
    pub implicit_actions: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            request_timeout_secs: 60,
            planner_timeout_secs: 20,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            tool_timeout_secs: 60,
            history_window: 6,
            default_mode: Mode::General,
            working_dir: PathBuf::from("."),
            user_memory: String::new(),
            full_context: false,
            implicit_actions: false,
        }
    }
}

impl ClientConfig {
    /// Parse a configuration from TOML text.  Missing keys keep defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| AgentError::Config {
            reason: format!("invalid config TOML: {e}"),
        })
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| AgentError::Config {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        debug!(path = %path.display(), "loaded config file");
        Self::from_toml_str(&text)
    }

    /// Overlay `TANDEM_*` environment variables.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(mode) = get(ENV_MODE) {
            self.default_mode = mode.parse()?;
        }
        if let Some(secs) = get(ENV_TIMEOUT_SECS) {
            self.request_timeout_secs = secs.trim().parse().map_err(|_| AgentError::Config {
                reason: format!("{ENV_TIMEOUT_SECS} must be a number of seconds, got `{secs}`"),
            })?;
        }
        if let Some(flag) = get(ENV_IMPLICIT_ACTIONS) {
            self.implicit_actions = parse_flag(&flag).ok_or_else(|| AgentError::Config {
                reason: format!("{ENV_IMPLICIT_ACTIONS} must be a boolean, got `{flag}`"),
            })?;
        }
        if let Some(memory) = get(ENV_USER_MEMORY) {
            self.user_memory = memory;
        }
        Ok(self)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.base_url).map_err(|e| AgentError::Config {
            reason: format!("invalid base_url `{}`: {e}", self.base_url),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AgentError::Config {
                reason: format!("base_url must be http(s), got `{}`", url.scheme()),
            });
        }
        if self.max_attempts == 0 {
            return Err(AgentError::Config {
                reason: "max_attempts must be at least 1".into(),
            });
        }
        if self.request_timeout_secs == 0 || self.planner_timeout_secs == 0 {
            return Err(AgentError::Config {
                reason: "timeouts must be non-zero".into(),
            });
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn planner_timeout(&self) -> Duration {
        Duration::from_secs(self.planner_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
