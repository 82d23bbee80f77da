use std::str::FromStr;

use super::option::{OptionKind, OptionSpec};
use super::{ParseError, ParseErrorKind};
use crate::{CurrentLine, Score, ScoreBound, SearchInfo};
use serde::{Deserialize, Serialize};

/// Incoming message from UCI engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciMessage {
    Id {
        name: Option<String>,
        author: Option<String>,
    },
    UciOk,
    ReadyOk,
    BestMove {
        mv: String,
        ponder: Option<String>,
    },
    CopyProtection(ProtectionStatus),
    Registration(ProtectionStatus),
    Info(SearchInfo),
    Option(OptionSpec),
}

/// Status reported by `copyprotection` and `registration` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtectionStatus {
    Checking,
    Ok,
    Error,
}

const ID_KEYWORDS: &[&str] = &["name", "author"];
const OPTION_KEYWORDS: &[&str] = &["name", "type", "default", "min", "max", "var"];

/// Parse a UCI message line
pub fn parse_uci_message(line: &str) -> Result<UciMessage, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let fail = |kind| ParseError::new(kind, line.trim());

    match tokens.first() {
        None => Err(fail(ParseErrorKind::Empty)),
        Some(&"uciok") => Ok(UciMessage::UciOk),
        Some(&"readyok") => Ok(UciMessage::ReadyOk),
        Some(&"id") => parse_id(&tokens[1..]).map_err(fail),
        Some(&"bestmove") => parse_bestmove(&tokens[1..]).map_err(fail),
        Some(&"copyprotection") => parse_status("copyprotection", &tokens[1..])
            .map(UciMessage::CopyProtection)
            .map_err(fail),
        Some(&"registration") => parse_status("registration", &tokens[1..])
            .map(UciMessage::Registration)
            .map_err(fail),
        Some(&"info") => parse_info_line(&tokens[1..])
            .map(UciMessage::Info)
            .map_err(fail),
        Some(&"option") => parse_option(&tokens[1..])
            .map(UciMessage::Option)
            .map_err(fail),
        Some(other) => Err(fail(ParseErrorKind::UnknownMessage(other.to_string()))),
    }
}

/// Group tokens into `(keyword, value)` pairs.
///
/// A value is every token up to the next keyword, joined with single spaces,
/// so free text such as engine names keeps its inner spaces. Tokens before
/// the first keyword are dropped.
fn keyword_fields<'a>(tokens: &[&'a str], keywords: &[&str]) -> Vec<(&'a str, String)> {
    let mut fields: Vec<(&'a str, Vec<&'a str>)> = Vec::new();
    for &token in tokens {
        if keywords.contains(&token) {
            fields.push((token, Vec::new()));
        } else if let Some((_, value)) = fields.last_mut() {
            value.push(token);
        }
    }
    fields
        .into_iter()
        .map(|(keyword, value)| (keyword, value.join(" ")))
        .collect()
}

fn parse_id(tokens: &[&str]) -> Result<UciMessage, ParseErrorKind> {
    let mut name = None;
    let mut author = None;
    for (keyword, value) in keyword_fields(tokens, ID_KEYWORDS) {
        if value.is_empty() {
            continue;
        }
        match keyword {
            "name" => name = Some(value),
            _ => author = Some(value),
        }
    }

    if name.is_none() && author.is_none() {
        return Err(ParseErrorKind::MissingField {
            message: "id",
            field: "name",
        });
    }
    Ok(UciMessage::Id { name, author })
}

fn parse_bestmove(tokens: &[&str]) -> Result<UciMessage, ParseErrorKind> {
    let mv = tokens.first().ok_or(ParseErrorKind::MissingField {
        message: "bestmove",
        field: "move",
    })?;
    let ponder = match tokens.get(1) {
        Some(&"ponder") => tokens.get(2).map(|s| s.to_string()),
        _ => None,
    };
    Ok(UciMessage::BestMove {
        mv: mv.to_string(),
        ponder,
    })
}

fn parse_status(message: &'static str, tokens: &[&str]) -> Result<ProtectionStatus, ParseErrorKind> {
    match tokens.first() {
        Some(&"checking") => Ok(ProtectionStatus::Checking),
        Some(&"ok") => Ok(ProtectionStatus::Ok),
        Some(&"error") => Ok(ProtectionStatus::Error),
        Some(other) => Err(ParseErrorKind::InvalidValue {
            field: "status",
            value: other.to_string(),
        }),
        None => Err(ParseErrorKind::MissingField {
            message,
            field: "status",
        }),
    }
}

fn parse_option(tokens: &[&str]) -> Result<OptionSpec, ParseErrorKind> {
    let fields = keyword_fields(tokens, OPTION_KEYWORDS);
    let lookup = |keyword: &str| {
        fields
            .iter()
            .find(|(k, _)| *k == keyword)
            .map(|(_, v)| v.as_str())
    };

    let name = lookup("name")
        .filter(|name| !name.is_empty())
        .ok_or(ParseErrorKind::MissingField {
            message: "option",
            field: "name",
        })?;
    let type_keyword = lookup("type").ok_or(ParseErrorKind::MissingField {
        message: "option",
        field: "type",
    })?;
    let kind = OptionKind::from_uci(type_keyword)
        .ok_or_else(|| ParseErrorKind::UnknownOptionType(type_keyword.to_string()))?;

    let mut spec = OptionSpec::new(name, kind);
    for (keyword, value) in &fields {
        match *keyword {
            "default" => spec.default = Some(value.clone()),
            "min" => spec.min = Some(parse_number("min", value)?),
            "max" => spec.max = Some(parse_number("max", value)?),
            "var" => spec.choices.push(value.clone()),
            _ => {}
        }
    }
    Ok(spec)
}

/// Parse an "info" line from the engine
fn parse_info_line(tokens: &[&str]) -> Result<SearchInfo, ParseErrorKind> {
    let mut info = SearchInfo::default();
    let mut i = 0;

    while i < tokens.len() {
        let keyword = tokens[i];
        i += 1;
        match keyword {
            "depth" => info.depth = Some(parse_next("depth", tokens, &mut i)?),
            "seldepth" => info.seldepth = Some(parse_next("seldepth", tokens, &mut i)?),
            "time" => info.time_ms = Some(parse_next("time", tokens, &mut i)?),
            "nodes" => info.nodes = Some(parse_next("nodes", tokens, &mut i)?),
            "multipv" => info.multipv = Some(parse_next("multipv", tokens, &mut i)?),
            "currmovenumber" => {
                info.currmovenumber = Some(parse_next("currmovenumber", tokens, &mut i)?)
            }
            "hashfull" => info.hashfull = Some(parse_next("hashfull", tokens, &mut i)?),
            "nps" => info.nps = Some(parse_next("nps", tokens, &mut i)?),
            "tbhits" => info.tbhits = Some(parse_next("tbhits", tokens, &mut i)?),
            "sbhits" => info.sbhits = Some(parse_next("sbhits", tokens, &mut i)?),
            "cpuload" => info.cpuload = Some(parse_next("cpuload", tokens, &mut i)?),
            "currmove" => {
                let mv = tokens.get(i).ok_or(ParseErrorKind::MissingField {
                    message: "info",
                    field: "currmove",
                })?;
                info.currmove = Some(mv.to_string());
                i += 1;
            }
            "score" => {
                info.score = Some(parse_score(tokens, &mut i)?);
                match tokens.get(i) {
                    Some(&"lowerbound") => {
                        info.score_bound = Some(ScoreBound::Lower);
                        i += 1;
                    }
                    Some(&"upperbound") => {
                        info.score_bound = Some(ScoreBound::Upper);
                        i += 1;
                    }
                    _ => {}
                }
            }
            "pv" => info.pv = Some(take_moves(tokens, &mut i)),
            "refutation" => info.refutation = Some(take_moves(tokens, &mut i)),
            "currline" => {
                let cpu = tokens.get(i).and_then(|s| s.parse().ok());
                if cpu.is_some() {
                    i += 1;
                }
                let moves = take_moves(tokens, &mut i);
                info.currline = Some(CurrentLine { cpu, moves });
            }
            "string" => {
                // The free text runs to the end of the line, keywords included
                info.string = Some(tokens[i..].join(" "));
                i = tokens.len();
            }
            _ => {
                // Unknown keyword, skip
            }
        }
    }

    Ok(info)
}

/// `score` is always a `kind value` pair.
fn parse_score(tokens: &[&str], i: &mut usize) -> Result<Score, ParseErrorKind> {
    let kind = tokens.get(*i).copied().unwrap_or_default();
    *i += 1;
    match kind {
        "cp" => parse_next("score cp", tokens, i).map(Score::Centipawns),
        "mate" => parse_next("score mate", tokens, i).map(Score::Mate),
        "" => Err(ParseErrorKind::MissingField {
            message: "info",
            field: "score",
        }),
        other => Err(ParseErrorKind::InvalidValue {
            field: "score",
            value: other.to_string(),
        }),
    }
}

/// Collect all moves until next keyword
fn take_moves(tokens: &[&str], i: &mut usize) -> Vec<String> {
    let mut moves = Vec::new();
    while *i < tokens.len() && !is_info_keyword(tokens[*i]) {
        moves.push(tokens[*i].to_string());
        *i += 1;
    }
    moves
}

fn parse_next<T: FromStr>(
    field: &'static str,
    tokens: &[&str],
    i: &mut usize,
) -> Result<T, ParseErrorKind> {
    let value = tokens.get(*i).ok_or(ParseErrorKind::MissingField {
        message: "info",
        field,
    })?;
    *i += 1;
    parse_number(field, value)
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, ParseErrorKind> {
    value.parse().map_err(|_| ParseErrorKind::InvalidValue {
        field,
        value: value.to_string(),
    })
}

fn is_info_keyword(token: &str) -> bool {
    matches!(
        token,
        "depth"
            | "seldepth"
            | "time"
            | "nodes"
            | "score"
            | "pv"
            | "multipv"
            | "currmove"
            | "currmovenumber"
            | "hashfull"
            | "nps"
            | "tbhits"
            | "sbhits"
            | "cpuload"
            | "string"
            | "refutation"
            | "currline"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_info(line: &str) -> SearchInfo {
        match parse_uci_message(line).unwrap() {
            UciMessage::Info(info) => info,
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_parse_acks() {
        assert_eq!(parse_uci_message("uciok").unwrap(), UciMessage::UciOk);
        assert_eq!(parse_uci_message("  readyok \r").unwrap(), UciMessage::ReadyOk);
    }

    #[test]
    fn test_parse_id_name() {
        let msg = parse_uci_message("id name Pikafish").unwrap();
        assert_eq!(
            msg,
            UciMessage::Id {
                name: Some("Pikafish".to_string()),
                author: None
            }
        );
    }

    #[test]
    fn test_parse_id_author_keeps_spaces() {
        let msg = parse_uci_message("id author A B C").unwrap();
        assert_eq!(
            msg,
            UciMessage::Id {
                name: None,
                author: Some("A B C".to_string())
            }
        );
    }

    #[test]
    fn test_parse_id_without_value() {
        let err = parse_uci_message("id name").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::MissingField { message: "id", .. }));
        assert_eq!(err.line, "id name");
    }

    #[test]
    fn test_parse_bestmove() {
        let msg = parse_uci_message("bestmove e2e4 ponder e7e5").unwrap();
        assert_eq!(
            msg,
            UciMessage::BestMove {
                mv: "e2e4".to_string(),
                ponder: Some("e7e5".to_string())
            }
        );

        let msg = parse_uci_message("bestmove e2e4").unwrap();
        assert_eq!(
            msg,
            UciMessage::BestMove {
                mv: "e2e4".to_string(),
                ponder: None
            }
        );
    }

    #[test]
    fn test_parse_bestmove_missing_move() {
        let err = parse_uci_message("bestmove").unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::MissingField {
                message: "bestmove",
                field: "move"
            }
        );
    }

    #[test]
    fn test_parse_protection_status() {
        assert_eq!(
            parse_uci_message("copyprotection checking").unwrap(),
            UciMessage::CopyProtection(ProtectionStatus::Checking)
        );
        assert_eq!(
            parse_uci_message("registration error").unwrap(),
            UciMessage::Registration(ProtectionStatus::Error)
        );
        assert!(parse_uci_message("registration maybe").is_err());
        assert!(parse_uci_message("copyprotection").is_err());
    }

    #[test]
    fn test_parse_info() {
        let info = parse_info("info depth 10 score cp 25 pv e2e4 e7e5");
        assert_eq!(info.depth, Some(10));
        assert_eq!(info.score, Some(Score::Centipawns(25)));
        assert_eq!(
            info.pv,
            Some(vec!["e2e4".to_string(), "e7e5".to_string()])
        );
        assert_eq!(info.nodes, None);
        assert_eq!(info.score_bound, None);
    }

    #[test]
    fn test_parse_info_full_line() {
        let info = parse_info(
            "info depth 12 seldepth 18 multipv 2 score mate -3 upperbound nodes 15234 \
             nps 812000 hashfull 12 tbhits 0 time 19 pv d1h5 g7g6",
        );
        assert_eq!(info.depth, Some(12));
        assert_eq!(info.seldepth, Some(18));
        assert_eq!(info.multipv, Some(2));
        assert_eq!(info.score, Some(Score::Mate(-3)));
        assert_eq!(info.score_bound, Some(ScoreBound::Upper));
        assert_eq!(info.nodes, Some(15234));
        assert_eq!(info.nps, Some(812000));
        assert_eq!(info.hashfull, Some(12));
        assert_eq!(info.tbhits, Some(0));
        assert_eq!(info.time_ms, Some(19));
        assert_eq!(info.pv.unwrap().len(), 2);
    }

    #[test]
    fn test_parse_info_currmove_and_lines() {
        let info = parse_info(
            "info currmove e2e4 currmovenumber 1 refutation d1h5 g6h5 currline 1 e2e4 e7e5 cpuload 950",
        );
        assert_eq!(info.currmove.as_deref(), Some("e2e4"));
        assert_eq!(info.currmovenumber, Some(1));
        assert_eq!(
            info.refutation,
            Some(vec!["d1h5".to_string(), "g6h5".to_string()])
        );
        assert_eq!(
            info.currline,
            Some(CurrentLine {
                cpu: Some(1),
                moves: vec!["e2e4".to_string(), "e7e5".to_string()]
            })
        );
        assert_eq!(info.cpuload, Some(950));
    }

    #[test]
    fn test_parse_info_string_runs_to_end_of_line() {
        let info = parse_info("info depth 3 string NNUE evaluation using nn.bin depth 5 enabled");
        assert_eq!(info.depth, Some(3));
        assert_eq!(
            info.string.as_deref(),
            Some("NNUE evaluation using nn.bin depth 5 enabled")
        );
    }

    #[test]
    fn test_parse_info_bad_number() {
        let err = parse_uci_message("info depth ten").unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::InvalidValue {
                field: "depth",
                value: "ten".to_string()
            }
        );
    }

    #[test]
    fn test_parse_info_bad_score_kind() {
        let err = parse_uci_message("info score wdl 500 300 200").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::InvalidValue { field: "score", .. }));
    }

    #[test]
    fn test_parse_info_skips_unknown_keywords() {
        let info = parse_info("info wdl depth 4");
        assert_eq!(info.depth, Some(4));
    }

    #[test]
    fn test_parse_option_spin() {
        let msg = parse_uci_message("option name Hash type spin default 16 min 1 max 4096").unwrap();
        let UciMessage::Option(spec) = msg else {
            panic!("Wrong message type");
        };
        assert_eq!(spec.name, "Hash");
        assert_eq!(spec.kind, OptionKind::Range);
        assert_eq!(spec.default.as_deref(), Some("16"));
        assert_eq!(spec.min, Some(1));
        assert_eq!(spec.max, Some(4096));
        assert!(spec.choices.is_empty());
    }

    #[test]
    fn test_parse_option_multi_word_name_and_combo() {
        let msg = parse_uci_message(
            "option name Analysis Contempt type combo default Both var Off var White var Black var Both",
        )
        .unwrap();
        let UciMessage::Option(spec) = msg else {
            panic!("Wrong message type");
        };
        assert_eq!(spec.name, "Analysis Contempt");
        assert_eq!(spec.kind, OptionKind::Enum);
        assert_eq!(spec.default.as_deref(), Some("Both"));
        assert_eq!(spec.choices, vec!["Off", "White", "Black", "Both"]);
    }

    #[test]
    fn test_parse_option_button_and_empty_string_default() {
        let UciMessage::Option(button) = parse_uci_message("option name Clear Hash type button").unwrap()
        else {
            panic!("Wrong message type");
        };
        assert_eq!(button.kind, OptionKind::Action);
        assert_eq!(button.default, None);

        let UciMessage::Option(text) =
            parse_uci_message("option name Debug Log File type string default").unwrap()
        else {
            panic!("Wrong message type");
        };
        assert_eq!(text.kind, OptionKind::Text);
        assert_eq!(text.default.as_deref(), Some(""));
    }

    #[test]
    fn test_parse_option_missing_fields() {
        let err = parse_uci_message("option type spin default 1").unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::MissingField {
                message: "option",
                field: "name"
            }
        );

        let err = parse_uci_message("option name Hash default 16").unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::MissingField {
                message: "option",
                field: "type"
            }
        );

        let err = parse_uci_message("option name Hash type slider").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnknownOptionType("slider".to_string()));
    }

    #[test]
    fn test_parse_unknown_and_empty() {
        let err = parse_uci_message("Stockfish 16 by the Stockfish developers").unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::UnknownMessage("Stockfish".to_string())
        );
        assert_eq!(parse_uci_message("   ").unwrap_err().kind, ParseErrorKind::Empty);
    }
}
