use std::fmt;

use crate::GoParams;

/// Outgoing command to a UCI engine.
///
/// `Display` renders the exact protocol line, without the trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciCommand {
    Uci,
    Debug(bool),
    IsReady,
    SetOption {
        name: String,
        value: Option<String>,
    },
    Register(Registration),
    UciNewGame,
    Position {
        fen: Option<String>,
        moves: Vec<String>,
    },
    Go(GoParams),
    Stop,
    PonderHit,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Later,
    Credentials { name: String, code: String },
}

impl UciCommand {
    /// Protocol keyword, used when reporting sequencing errors.
    pub fn keyword(&self) -> &'static str {
        match self {
            UciCommand::Uci => "uci",
            UciCommand::Debug(_) => "debug",
            UciCommand::IsReady => "isready",
            UciCommand::SetOption { .. } => "setoption",
            UciCommand::Register(_) => "register",
            UciCommand::UciNewGame => "ucinewgame",
            UciCommand::Position { .. } => "position",
            UciCommand::Go(_) => "go",
            UciCommand::Stop => "stop",
            UciCommand::PonderHit => "ponderhit",
            UciCommand::Quit => "quit",
        }
    }
}

impl fmt::Display for UciCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UciCommand::Debug(on) => write!(f, "debug {}", if *on { "on" } else { "off" }),
            UciCommand::SetOption { name, value } => {
                write!(f, "setoption name {}", name)?;
                if let Some(value) = value {
                    write!(f, " value {}", value)?;
                }
                Ok(())
            }
            UciCommand::Register(Registration::Later) => f.write_str("register later"),
            UciCommand::Register(Registration::Credentials { name, code }) => {
                write!(f, "register name {} code {}", name, code)
            }
            UciCommand::Position { fen, moves } => {
                match fen {
                    Some(fen) => write!(f, "position fen {}", fen)?,
                    None => f.write_str("position startpos")?,
                }
                if !moves.is_empty() {
                    write!(f, " moves {}", moves.join(" "))?;
                }
                Ok(())
            }
            UciCommand::Go(params) => {
                f.write_str("go")?;
                write_go_params(f, params)
            }
            other => f.write_str(other.keyword()),
        }
    }
}

fn write_go_params(f: &mut fmt::Formatter<'_>, params: &GoParams) -> fmt::Result {
    if !params.searchmoves.is_empty() {
        write!(f, " searchmoves {}", params.searchmoves.join(" "))?;
    }
    if params.ponder {
        f.write_str(" ponder")?;
    }
    let numeric = [
        ("wtime", params.wtime),
        ("btime", params.btime),
        ("winc", params.winc),
        ("binc", params.binc),
        ("movestogo", params.movestogo.map(u64::from)),
        ("depth", params.depth.map(u64::from)),
        ("nodes", params.nodes),
        ("mate", params.mate.map(u64::from)),
        ("movetime", params.movetime),
    ];
    for (keyword, value) in numeric {
        if let Some(value) = value {
            write!(f, " {} {}", keyword, value)?;
        }
    }
    if params.infinite {
        f.write_str(" infinite")?;
    }
    Ok(())
}
