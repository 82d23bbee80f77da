//! Engine configuration for the CLI.
//!
//! Starts from [`EngineConfig::from_env`] and layers the command-line flags
//! on top, so a flag always wins over the matching `UCILINK_*` variable.

use std::path::PathBuf;
use std::time::Duration;

use engine::locate::default_engine_path;
use engine::EngineConfig;

/// Engine-related flags shared by every subcommand.
#[derive(Debug, Default, Clone)]
pub struct EngineFlags {
    pub engine: Option<PathBuf>,
    pub args: Vec<String>,
    pub options: Vec<(String, String)>,
    pub init_timeout_ms: Option<u64>,
}

/// Build the session configuration.
///
/// Engine path priority:
/// 1. `--engine`
/// 2. `UCILINK_ENGINE`, `stockfish` in `PATH`, common install locations
/// 3. `stockfish` as fallback
pub fn engine_config(flags: &EngineFlags) -> EngineConfig {
    let mut config = EngineConfig::from_env().with_label("ucilink");

    match flags.engine.clone().or_else(default_engine_path) {
        Some(path) => config.path = path,
        None => tracing::debug!("No engine found, falling back to {}", config.path.display()),
    }

    config.args = flags.args.clone();
    for (name, value) in &flags.options {
        config = config.with_option(name.clone(), value.clone());
    }
    if let Some(ms) = flags.init_timeout_ms {
        config.init_timeout = Duration::from_millis(ms);
    }

    config
}

/// Parse a `NAME=VALUE` option flag. The name may contain spaces.
pub fn parse_option(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("option name is empty in '{}'", s));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_option() {
        assert_eq!(
            parse_option("Hash=128").unwrap(),
            ("Hash".to_string(), "128".to_string())
        );
        assert_eq!(
            parse_option("Clear Hash = ").unwrap(),
            ("Clear Hash".to_string(), String::new())
        );
        assert_eq!(
            parse_option("SyzygyPath=/tb=a").unwrap(),
            ("SyzygyPath".to_string(), "/tb=a".to_string())
        );
        assert!(parse_option("Hash").is_err());
        assert!(parse_option("=1").is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let engine = dir.path().join("my-engine");
        std::fs::write(&engine, "").unwrap();

        let flags = EngineFlags {
            engine: Some(engine.clone()),
            args: vec!["--uci".to_string()],
            options: vec![("Threads".to_string(), "2".to_string())],
            init_timeout_ms: Some(250),
        };
        let config = engine_config(&flags);

        assert_eq!(config.path, engine);
        assert_eq!(config.args, vec!["--uci"]);
        assert_eq!(config.options, vec![("Threads".to_string(), "2".to_string())]);
        assert_eq!(config.init_timeout, Duration::from_millis(250));
        assert_eq!(config.label.as_deref(), Some("ucilink"));
    }
}
