//! Configuration for an engine session.
//!
//! Every value has a compile-time default. [`EngineConfig::from_env`] applies
//! the `UCILINK_*` environment overrides on top of those defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::process::{StopPolicy, DEFAULT_QUIT_GRACE, DEFAULT_TERMINATE_GRACE};

/// Default engine program, resolved through `PATH`.
pub const DEFAULT_ENGINE: &str = "stockfish";

/// Default time to wait for `uciok` after `uci`.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time to wait for a reply to any other command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for engine launch and protocol timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Engine executable. A bare name is looked up in `PATH`.
    pub path: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub init_timeout: Duration,
    pub command_timeout: Duration,
    pub quit_grace: Duration,
    pub terminate_grace: Duration,
    /// Options sent with `setoption` during initialization, in order.
    pub options: Vec<(String, String)>,
    /// Label attached to the session's tracing span.
    pub label: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_ENGINE),
            args: Vec::new(),
            working_dir: None,
            init_timeout: DEFAULT_INIT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            quit_grace: DEFAULT_QUIT_GRACE,
            terminate_grace: DEFAULT_TERMINATE_GRACE,
            options: Vec::new(),
            label: None,
        }
    }
}

impl EngineConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Defaults with environment overrides applied.
    ///
    /// Priority for the engine path:
    /// 1. `UCILINK_ENGINE` env variable if set
    /// 2. `stockfish` as fallback
    ///
    /// `UCILINK_INIT_TIMEOUT_MS` and `UCILINK_COMMAND_TIMEOUT_MS` override the
    /// timeouts; values that do not parse as `u64` are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("UCILINK_ENGINE") {
            config.path = PathBuf::from(path);
        }
        if let Some(timeout) = env_millis("UCILINK_INIT_TIMEOUT_MS") {
            config.init_timeout = timeout;
        }
        if let Some(timeout) = env_millis("UCILINK_COMMAND_TIMEOUT_MS") {
            config.command_timeout = timeout;
        }
        config
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_stop_policy(mut self, policy: StopPolicy) -> Self {
        self.quit_grace = policy.quit_grace;
        self.terminate_grace = policy.terminate_grace;
        self
    }

    /// Add an option applied during initialization.
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((name.into(), value.into()));
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn stop_policy(&self) -> StopPolicy {
        StopPolicy {
            quit_grace: self.quit_grace,
            terminate_grace: self.terminate_grace,
        }
    }
}

fn env_millis(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|value| value.parse().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.path, PathBuf::from(DEFAULT_ENGINE));
        assert_eq!(config.init_timeout, Duration::from_secs(10));
        assert_eq!(config.command_timeout, Duration::from_secs(5));
        assert_eq!(config.stop_policy(), StopPolicy::default());
        assert!(config.options.is_empty());
    }

    #[test]
    fn test_from_env_path() {
        let config = EngineConfig::from_env();
        match std::env::var("UCILINK_ENGINE") {
            Ok(val) => assert_eq!(config.path, PathBuf::from(val)),
            Err(_) => assert_eq!(config.path, PathBuf::from(DEFAULT_ENGINE)),
        }
    }

    #[test]
    fn test_builder_keeps_option_order() {
        let config = EngineConfig::new("/opt/engines/sf")
            .with_args(["--bench-free"])
            .with_option("Threads", "2")
            .with_option("Hash", "64")
            .with_label("analysis");
        assert_eq!(config.args, vec!["--bench-free".to_string()]);
        assert_eq!(
            config.options,
            vec![
                ("Threads".to_string(), "2".to_string()),
                ("Hash".to_string(), "64".to_string())
            ]
        );
        assert_eq!(config.label.as_deref(), Some("analysis"));
    }

    #[test]
    fn test_env_millis_ignores_garbage() {
        assert_eq!(env_millis("UCILINK_TEST_UNSET_VARIABLE"), None);
    }
}
