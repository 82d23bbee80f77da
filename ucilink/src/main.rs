//! ucilink - drive a UCI chess engine from the command line.
//!
//! `probe` starts the engine, runs the handshake and prints what the engine
//! reports about itself. `analyse` searches a position and streams search
//! progress until the engine reports its best move. Logs go to stderr
//! (`RUST_LOG` selects the level); results go to stdout, optionally as JSON.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use engine::{
    Capabilities, EngineEvent, EngineSession, GoParams, OptionKind, OptionSpec, SearchInfo, Score,
    ScoreBound,
};
use tokio::sync::broadcast;

mod config;
mod position;

/// Depth used when no search limit is given.
const DEFAULT_DEPTH: u32 = 12;

/// Upper bound on a depth- or node-limited search.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Parser)]
#[command(name = "ucilink", about = "Drive a UCI chess engine from the command line")]
struct Cli {
    /// Engine executable. Defaults to $UCILINK_ENGINE, then Stockfish.
    #[arg(short, long, global = true)]
    engine: Option<PathBuf>,

    /// Argument passed to the engine. Repeatable.
    #[arg(long = "arg", global = true, allow_hyphen_values = true)]
    engine_args: Vec<String>,

    /// Engine option applied during initialization, as NAME=VALUE. Repeatable.
    #[arg(short, long = "option", global = true, value_parser = config::parse_option)]
    options: Vec<(String, String)>,

    /// How long to wait for the handshake, in milliseconds.
    #[arg(long, global = true)]
    init_timeout_ms: Option<u64>,

    /// Print results as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine and print its name, author and options.
    Probe,
    /// Search a position and print the best move.
    Analyse(AnalyseArgs),
}

#[derive(Args)]
struct AnalyseArgs {
    /// Position to search. Defaults to the start position.
    #[arg(long)]
    fen: Option<String>,

    /// Moves played from the position, in UCI notation.
    #[arg(long, num_args = 1..)]
    moves: Vec<String>,

    /// Search to this depth.
    #[arg(long, conflicts_with_all = ["movetime", "nodes"])]
    depth: Option<u32>,

    /// Search for this many milliseconds.
    #[arg(long, conflicts_with = "nodes")]
    movetime: Option<u64>,

    /// Search this many nodes.
    #[arg(long)]
    nodes: Option<u64>,

    /// Number of lines to report.
    #[arg(long, default_value_t = 1)]
    multipv: u32,
}

impl AnalyseArgs {
    fn go_params(&self) -> GoParams {
        let mut params = GoParams {
            depth: self.depth,
            movetime: self.movetime,
            nodes: self.nodes,
            ..Default::default()
        };
        if params.depth.is_none() && params.movetime.is_none() && params.nodes.is_none() {
            params.depth = Some(DEFAULT_DEPTH);
        }
        params
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    use tracing_subscriber::fmt::format::FmtSpan;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let flags = config::EngineFlags {
        engine: cli.engine,
        args: cli.engine_args,
        options: cli.options,
        init_timeout_ms: cli.init_timeout_ms,
    };

    match cli.command {
        Commands::Probe => probe(&flags, cli.json).await,
        Commands::Analyse(args) => analyse(&flags, &args, cli.json).await,
    }
}

async fn start_engine(flags: &config::EngineFlags) -> Result<EngineSession> {
    let config = config::engine_config(flags);
    let path = config.path.clone();
    let session = EngineSession::new(config);
    session
        .initialize()
        .await
        .with_context(|| format!("failed to initialize engine {}", path.display()))?;
    Ok(session)
}

async fn probe(flags: &config::EngineFlags, json: bool) -> Result<()> {
    let session = start_engine(flags).await?;
    let caps = session.capabilities().await?;
    session.shutdown().await?;

    if json {
        println!("{}", serde_json::to_string(&caps)?);
    } else {
        print!("{}", format_capabilities(&caps));
    }
    Ok(())
}

async fn analyse(flags: &config::EngineFlags, args: &AnalyseArgs, json: bool) -> Result<()> {
    position::validate(args.fen.as_deref(), &args.moves)?;

    let session = start_engine(flags).await?;
    let result = run_search(&session, args, json).await;
    if let Err(e) = session.shutdown().await {
        tracing::warn!("Engine shutdown failed: {}", e);
    }
    let (mv, ponder) = result?;

    if json {
        let line = serde_json::json!({ "bestmove": mv, "ponder": ponder });
        println!("{}", line);
    } else {
        match ponder {
            Some(ponder) => println!("bestmove {} ponder {}", mv, ponder),
            None => println!("bestmove {}", mv),
        }
    }
    Ok(())
}

async fn run_search(
    session: &EngineSession,
    args: &AnalyseArgs,
    json: bool,
) -> Result<(String, Option<String>)> {
    if args.multipv > 1 {
        let caps = session.capabilities().await?;
        if caps.option("MultiPV").is_none() {
            tracing::warn!("Engine does not declare MultiPV; reporting a single line");
        }
        let multipv = args.multipv.to_string();
        session.set_option("MultiPV", Some(multipv.as_str())).await?;
    }

    session.new_game().await?;
    session
        .set_position(args.fen.as_deref(), args.moves.iter().cloned())
        .await?;

    let params = args.go_params();
    let limit = match params.movetime {
        Some(ms) => Duration::from_millis(ms) + session.config().command_timeout,
        None => SEARCH_TIMEOUT,
    };

    // Subscribe before `go` so no search output is missed
    let mut events = session.subscribe();
    session.start_search(params).await?;

    tokio::time::timeout(limit, collect_best_move(session, &mut events, json))
        .await
        .with_context(|| format!("engine did not report a best move within {:?}", limit))?
}

async fn collect_best_move(
    session: &EngineSession,
    events: &mut broadcast::Receiver<EngineEvent>,
    json: bool,
) -> Result<(String, Option<String>)> {
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(EngineEvent::Info(info)) => print_info(&info, json)?,
                Ok(EngineEvent::BestMove { mv, ponder }) => return Ok((mv, ponder)),
                Ok(EngineEvent::Terminated { code }) => {
                    bail!("engine exited during the search (exit code {:?})", code)
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Dropped {} engine events", n);
                }
                Err(broadcast::error::RecvError::Closed) => bail!("engine session closed"),
            },
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                signal.context("failed to listen for Ctrl-C")?;
                tracing::info!("Interrupted, stopping search");
                interrupted = true;
                session.stop_search().await?;
            }
        }
    }
}

fn print_info(info: &SearchInfo, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(info)?);
    } else if let Some(line) = format_info(info) {
        println!("{}", line);
    }
    Ok(())
}

/// One human-readable line per principal variation; other info is skipped.
fn format_info(info: &SearchInfo) -> Option<String> {
    let pv = info.pv.as_ref()?;
    let mut line = String::new();
    if let Some(multipv) = info.multipv {
        line.push_str(&format!("[{}] ", multipv));
    }
    if let Some(depth) = info.depth {
        line.push_str(&format!("depth {} ", depth));
    }
    match info.score {
        Some(Score::Centipawns(cp)) => line.push_str(&format!("score cp {} ", cp)),
        Some(Score::Mate(n)) => line.push_str(&format!("score mate {} ", n)),
        None => {}
    }
    match info.score_bound {
        Some(ScoreBound::Lower) => line.push_str("(lower) "),
        Some(ScoreBound::Upper) => line.push_str("(upper) "),
        None => {}
    }
    if let Some(nodes) = info.nodes {
        line.push_str(&format!("nodes {} ", nodes));
    }
    line.push_str("pv ");
    line.push_str(&pv.join(" "));
    Some(line)
}

fn format_capabilities(caps: &Capabilities) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "name:   {}\n",
        caps.name.as_deref().unwrap_or("(unknown)")
    ));
    out.push_str(&format!(
        "author: {}\n",
        caps.author.as_deref().unwrap_or("(unknown)")
    ));
    out.push_str(&format!("options ({}):\n", caps.options.len()));
    for spec in caps.options.values() {
        out.push_str(&format!("  {}\n", format_option(spec)));
    }
    out
}

fn format_option(spec: &OptionSpec) -> String {
    let mut line = format!("{} [{}]", spec.name, spec.kind.as_uci());
    if let Some(default) = &spec.default {
        line.push_str(&format!(" default {:?}", default));
    }
    if spec.kind == OptionKind::Range {
        if let (Some(min), Some(max)) = (spec.min, spec.max) {
            line.push_str(&format!(" range {}..={}", min, max));
        }
    }
    if !spec.choices.is_empty() {
        line.push_str(&format!(" choices {}", spec.choices.join("/")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_analyse_flags() {
        let cli = Cli::try_parse_from([
            "ucilink",
            "--option",
            "Hash=64",
            "analyse",
            "--moves",
            "e2e4",
            "e7e5",
            "--movetime",
            "500",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.options, vec![("Hash".to_string(), "64".to_string())]);
        let Commands::Analyse(args) = cli.command else {
            panic!("expected analyse");
        };
        assert_eq!(args.moves, vec!["e2e4", "e7e5"]);
        let params = args.go_params();
        assert_eq!(params.movetime, Some(500));
        assert_eq!(params.depth, None);
    }

    #[test]
    fn test_default_depth() {
        let cli = Cli::try_parse_from(["ucilink", "analyse"]).unwrap();
        let Commands::Analyse(args) = cli.command else {
            panic!("expected analyse");
        };
        assert_eq!(args.go_params().depth, Some(DEFAULT_DEPTH));
    }

    #[test]
    fn test_conflicting_limits_rejected() {
        assert!(Cli::try_parse_from(["ucilink", "analyse", "--depth", "5", "--nodes", "10"]).is_err());
    }

    #[test]
    fn test_format_info() {
        let info = SearchInfo {
            depth: Some(14),
            multipv: Some(2),
            score: Some(Score::Mate(-3)),
            nodes: Some(1200),
            pv: Some(vec!["e2e4".to_string(), "e7e5".to_string()]),
            ..Default::default()
        };
        assert_eq!(
            format_info(&info).unwrap(),
            "[2] depth 14 score mate -3 nodes 1200 pv e2e4 e7e5"
        );
        assert!(format_info(&SearchInfo::default()).is_none());
    }

    #[test]
    fn test_format_option() {
        let mut hash = OptionSpec::new("Hash", OptionKind::Range);
        hash.default = Some("16".to_string());
        hash.min = Some(1);
        hash.max = Some(1024);
        assert_eq!(format_option(&hash), "Hash [spin] default \"16\" range 1..=1024");

        let mut style = OptionSpec::new("Style", OptionKind::Enum);
        style.choices = vec!["Solid".to_string(), "Risky".to_string()];
        assert_eq!(format_option(&style), "Style [combo] choices Solid/Risky");
    }
}
