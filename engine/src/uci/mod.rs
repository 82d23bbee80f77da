pub mod command;
pub mod option;
pub mod parser;

pub use command::{Registration, UciCommand};
pub use option::{OptionKind, OptionSpec};
pub use parser::{parse_uci_message, ProtectionStatus, UciMessage};

/// A line from the engine that could not be turned into a [`UciMessage`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} in line {line:?}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: String,
}

impl ParseError {
    pub(crate) fn new(kind: ParseErrorKind, line: &str) -> Self {
        Self {
            kind,
            line: line.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("empty line")]
    Empty,
    #[error("unknown UCI message '{0}'")]
    UnknownMessage(String),
    #[error("'{message}' is missing its '{field}' field")]
    MissingField {
        message: &'static str,
        field: &'static str,
    },
    #[error("invalid value '{value}' for '{field}'")]
    InvalidValue { field: &'static str, value: String },
    #[error("unknown option type '{0}'")]
    UnknownOptionType(String),
}
