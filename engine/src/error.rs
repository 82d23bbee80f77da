use std::path::PathBuf;
use std::time::Duration;

use crate::session::EngineState;
use crate::uci::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to launch engine {}: {reason}", path.display())]
    Launch { path: PathBuf, reason: String },
    #[error("Engine process is not running")]
    NotRunning,
    #[error("Engine is already running")]
    AlreadyRunning,
    #[error("Command '{command}' is not valid while the engine is {state}")]
    InvalidCommandForState {
        command: &'static str,
        state: EngineState,
    },
    #[error("Timed out after {0:?} waiting for the engine")]
    Timeout(Duration),
    #[error("Malformed engine output: {0}")]
    Parse(#[from] ParseError),
    #[error("Engine process terminated (exit code {code:?})")]
    ProcessTerminated { code: Option<i32> },
    #[error("Another wait is already pending")]
    WaitInProgress,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Engine session has shut down")]
    SessionClosed,
}

impl EngineError {
    pub(crate) fn launch(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        EngineError::Launch {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
