//! Supervised UCI engine sessions.
//!
//! The crate is layered bottom-up: [`uci`] turns protocol lines into typed
//! messages and back, [`process`] owns the engine child process and its
//! pipes, and [`session`] sequences commands against the engine state
//! machine and resolves replies.

pub mod config;
pub mod error;
pub mod locate;
pub mod process;
pub mod session;
pub mod uci;

pub use config::EngineConfig;
pub use error::EngineError;
pub use process::{EngineProcess, ProcessEvent, StopPolicy};
pub use session::{Capabilities, EngineSession, EngineState};
pub use uci::{
    parse_uci_message, OptionKind, OptionSpec, ParseError, ParseErrorKind, ProtectionStatus,
    Registration, UciCommand, UciMessage,
};

use serde::{Deserialize, Serialize};

/// Parameters for the "go" command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoParams {
    /// Restrict the search to these moves. Omitted when empty.
    pub searchmoves: Vec<String>,
    pub ponder: bool,
    pub wtime: Option<u64>, // Remaining time in milliseconds
    pub btime: Option<u64>,
    pub winc: Option<u64>, // Increment per move in milliseconds
    pub binc: Option<u64>,
    pub movestogo: Option<u32>,
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    pub mate: Option<u32>,
    pub movetime: Option<u64>, // Move time in milliseconds
    pub infinite: bool,        // Search until "stop"
}

impl GoParams {
    /// Search to a fixed depth.
    pub fn depth(depth: u32) -> Self {
        Self {
            depth: Some(depth),
            ..Default::default()
        }
    }

    /// Search for a fixed time in milliseconds.
    pub fn movetime(ms: u64) -> Self {
        Self {
            movetime: Some(ms),
            ..Default::default()
        }
    }

    /// Search until a `stop` is sent.
    pub fn infinite() -> Self {
        Self {
            infinite: true,
            ..Default::default()
        }
    }
}

/// Events broadcast by a session to all subscribers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    StateChanged(EngineState),
    BestMove {
        mv: String,
        ponder: Option<String>,
    },
    Info(SearchInfo),
    CopyProtection(ProtectionStatus),
    Registration(ProtectionStatus),
    /// A line the engine wrote to stderr.
    Diagnostic(String),
    /// A stdout line that could not be parsed. It was skipped.
    Malformed(ParseError),
    RawUciMessage {
        direction: UciMessageDirection,
        message: String,
    },
    Terminated {
        code: Option<i32>,
    },
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UciMessageDirection {
    ToEngine,
    FromEngine,
}

/// Search progress reported through `info` lines.
///
/// Every field is independently optional; an absent field was not part of
/// the line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchInfo {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub time_ms: Option<u64>,
    pub nodes: Option<u64>,
    pub pv: Option<Vec<String>>, // Principal variation
    pub multipv: Option<u32>,
    pub score: Option<Score>,
    pub score_bound: Option<ScoreBound>,
    pub currmove: Option<String>,
    pub currmovenumber: Option<u32>,
    pub hashfull: Option<u32>, // Permille
    pub nps: Option<u64>,
    pub tbhits: Option<u64>,
    pub sbhits: Option<u64>,
    pub cpuload: Option<u32>, // Permille
    pub string: Option<String>,
    pub refutation: Option<Vec<String>>,
    pub currline: Option<CurrentLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Score {
    Centipawns(i32),
    Mate(i32), // Negative for being mated
}

/// Marks a score as only a bound on the true value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreBound {
    Lower,
    Upper,
}

/// The line a search thread is currently calculating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentLine {
    pub cpu: Option<u32>,
    pub moves: Vec<String>,
}
