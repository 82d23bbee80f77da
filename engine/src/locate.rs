//! Engine executable discovery.

use std::path::{Path, PathBuf};

/// Common Stockfish install locations, checked in order.
const COMMON_ENGINE_PATHS: &[&str] = &[
    "/usr/local/bin/stockfish",
    "/usr/bin/stockfish",
    "/opt/homebrew/bin/stockfish",
    "/usr/games/stockfish",
];

/// Resolve an engine path.
///
/// Paths with a directory component are returned unchanged. A bare program
/// name is looked up in the directories of `PATH`; if it is not found there
/// the name is returned as-is so the launch error names what was asked for.
pub fn find_engine(path: &Path) -> PathBuf {
    if path.components().count() != 1 || path.is_absolute() {
        return path.to_path_buf();
    }

    if let Some(paths) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&paths) {
            let candidate = dir.join(path);
            if candidate.is_file() {
                tracing::debug!("Resolved {} to {}", path.display(), candidate.display());
                return candidate;
            }
        }
    }

    path.to_path_buf()
}

/// Find a default engine when none was configured.
///
/// Priority:
/// 1. `UCILINK_ENGINE` env variable if set
/// 2. `stockfish` in `PATH`
/// 3. Common install locations
pub fn default_engine_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("UCILINK_ENGINE") {
        return Some(find_engine(Path::new(&path)));
    }

    let from_path = find_engine(Path::new(crate::config::DEFAULT_ENGINE));
    if from_path.is_absolute() {
        return Some(from_path);
    }

    COMMON_ENGINE_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.is_file())
}
