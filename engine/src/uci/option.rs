use serde::{Deserialize, Serialize};

/// A configurable option declared by the engine in response to `uci`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSpec {
    pub name: String,
    pub kind: OptionKind,
    pub default: Option<String>,
    pub min: Option<i64>, // Range options only
    pub max: Option<i64>,
    pub choices: Vec<String>, // Enum options only
}

impl OptionSpec {
    pub fn new(name: impl Into<String>, kind: OptionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            min: None,
            max: None,
            choices: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionKind {
    Toggle,
    Range,
    Enum,
    Action,
    Text,
}

impl OptionKind {
    /// Map the protocol type keyword (`check`, `spin`, ...) to a kind.
    pub fn from_uci(keyword: &str) -> Option<Self> {
        match keyword {
            "check" => Some(OptionKind::Toggle),
            "spin" => Some(OptionKind::Range),
            "combo" => Some(OptionKind::Enum),
            "button" => Some(OptionKind::Action),
            "string" => Some(OptionKind::Text),
            _ => None,
        }
    }

    pub fn as_uci(self) -> &'static str {
        match self {
            OptionKind::Toggle => "check",
            OptionKind::Range => "spin",
            OptionKind::Enum => "combo",
            OptionKind::Action => "button",
            OptionKind::Text => "string",
        }
    }
}
