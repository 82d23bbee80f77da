//! Scripted UCI engine used by the integration tests.
//!
//! Flags change its behaviour:
//! - `--banner`: print an unparsable banner first and before every `readyok`
//! - `--no-uciok`: never finish the handshake
//! - `--crash-on-go`: exit with code 7 when a search starts
//! - `--stderr`: echo every command to stderr
//! - `--ignore-quit`: keep running after `quit` and stdin EOF
//! - `--chatty`: stream `info` lines without pause during an infinite search

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

struct Flags {
    banner: bool,
    no_uciok: bool,
    crash_on_go: bool,
    stderr: bool,
    ignore_quit: bool,
    chatty: bool,
}

impl Flags {
    fn from_args() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let has = |flag: &str| args.iter().any(|a| a == flag);
        Self {
            banner: has("--banner"),
            no_uciok: has("--no-uciok"),
            crash_on_go: has("--crash-on-go"),
            stderr: has("--stderr"),
            ignore_quit: has("--ignore-quit"),
            chatty: has("--chatty"),
        }
    }
}

fn main() -> io::Result<()> {
    let flags = Flags::from_args();
    let stdin = io::stdin();
    let mut out = io::stdout();
    let mut searching = false;
    let mut streamer: Option<(Arc<AtomicBool>, JoinHandle<()>)> = None;

    if flags.banner {
        writeln!(out, "Mock engine 1.0 by the ucilink tests")?;
        out.flush()?;
    }

    for line in stdin.lock().lines() {
        let line = line?;
        let command = line.trim();
        if flags.stderr {
            eprintln!("mock received: {}", command);
        }
        let mut tokens = command.split_whitespace();

        match tokens.next() {
            Some("uci") => {
                writeln!(out, "id name Mock Engine 1.0")?;
                writeln!(out, "id author The ucilink tests")?;
                writeln!(
                    out,
                    "option name Hash type spin default 16 min 1 max 1024"
                )?;
                writeln!(out, "option name Ponder type check default false")?;
                writeln!(
                    out,
                    "option name Style type combo default Normal var Solid var Normal var Risky"
                )?;
                writeln!(out, "option name Clear Hash type button")?;
                if !flags.no_uciok {
                    writeln!(out, "uciok")?;
                }
            }
            Some("isready") => {
                if flags.banner {
                    writeln!(out, "this line is not uci")?;
                }
                writeln!(out, "readyok")?;
            }
            Some("setoption") => {
                let rest: Vec<&str> = tokens.collect();
                writeln!(out, "info string setoption {}", rest.join(" "))?;
            }
            Some("go") => {
                if flags.crash_on_go {
                    out.flush()?;
                    std::process::exit(7);
                }
                let params: Vec<&str> = tokens.collect();
                writeln!(out, "info depth 1 seldepth 1 score cp 13 nodes 20 pv e2e4")?;
                writeln!(
                    out,
                    "info depth 2 seldepth 3 multipv 1 score cp 18 nodes 412 nps 41200 pv e2e4 e7e5"
                )?;
                if params.contains(&"infinite") || params.contains(&"ponder") {
                    searching = true;
                    if flags.chatty {
                        streamer = Some(stream_info());
                    }
                } else {
                    writeln!(out, "bestmove e2e4 ponder e7e5")?;
                }
            }
            Some("stop") | Some("ponderhit") => {
                if let Some((done, handle)) = streamer.take() {
                    done.store(true, Ordering::Relaxed);
                    let _ = handle.join();
                }
                if searching {
                    searching = false;
                    writeln!(out, "bestmove e2e4 ponder e7e5")?;
                }
            }
            Some("quit") => {
                if !flags.ignore_quit {
                    return Ok(());
                }
            }
            _ => {}
        }
        out.flush()?;
    }

    if flags.ignore_quit {
        std::thread::sleep(Duration::from_secs(60));
    }
    Ok(())
}

/// Write `info` lines from a background thread until the flag is set.
fn stream_info() -> (Arc<AtomicBool>, JoinHandle<()>) {
    let done = Arc::new(AtomicBool::new(false));
    let flag = done.clone();
    let handle = std::thread::spawn(move || {
        let mut nodes: u64 = 0;
        while !flag.load(Ordering::Relaxed) {
            nodes += 1000;
            let mut out = io::stdout().lock();
            if writeln!(out, "info depth 30 currmove e2e4 currmovenumber 1 nodes {}", nodes)
                .and_then(|()| out.flush())
                .is_err()
            {
                break;
            }
            drop(out);
            std::thread::sleep(Duration::from_micros(50));
        }
    });
    (done, handle)
}
