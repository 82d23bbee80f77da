use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};

use super::waiter::ResponseWaiter;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::locate::find_engine;
use crate::process::{EngineProcess, ProcessEvent};
use crate::uci::{parse_uci_message, OptionSpec, ProtectionStatus, UciCommand, UciMessage};
use crate::{EngineEvent, UciMessageDirection};

/// Protocol state of an engine session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Idle,
    Initializing,
    Ready,
    Searching,
    Pondering,
    Error,
}

impl EngineState {
    /// Whether a process is expected to be running and accepting commands.
    pub fn is_live(self) -> bool {
        !matches!(self, EngineState::Idle | EngineState::Error)
    }

    pub fn is_searching(self) -> bool {
        matches!(self, EngineState::Searching | EngineState::Pondering)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Idle => "idle",
            EngineState::Initializing => "initializing",
            EngineState::Ready => "ready",
            EngineState::Searching => "searching",
            EngineState::Pondering => "pondering",
            EngineState::Error => "in error",
        };
        f.write_str(name)
    }
}

/// What the engine has told us about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub name: Option<String>,
    pub author: Option<String>,
    pub options: BTreeMap<String, OptionSpec>,
}

impl Capabilities {
    /// Look up a declared option. UCI option names are case-insensitive.
    pub fn option(&self, name: &str) -> Option<&OptionSpec> {
        self.options.get(name).or_else(|| {
            self.options
                .values()
                .find(|spec| spec.name.eq_ignore_ascii_case(name))
        })
    }
}

/// Everything the session actor owns.
pub(crate) struct SessionState {
    pub(crate) config: EngineConfig,
    pub(crate) state: EngineState,
    pub(crate) handshake_seen: bool,
    /// `bestmove` replies still owed by searches that were stopped.
    pub(crate) stopped_searches: u32,
    pub(crate) capabilities: Capabilities,
    pub(crate) waiter: ResponseWaiter,
    process: Option<EngineProcess>,
    process_rx: Option<mpsc::UnboundedReceiver<ProcessEvent>>,
    state_tx: watch::Sender<EngineState>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl SessionState {
    pub(crate) fn new(
        config: EngineConfig,
        state_tx: watch::Sender<EngineState>,
        event_tx: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            config,
            state: EngineState::Idle,
            handshake_seen: false,
            stopped_searches: 0,
            capabilities: Capabilities::default(),
            waiter: ResponseWaiter::default(),
            process: None,
            process_rx: None,
            state_tx,
            event_tx,
        }
    }

    pub(crate) fn has_process(&self) -> bool {
        self.process.is_some()
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    pub(crate) fn set_state(&mut self, next: EngineState) {
        if self.state == next {
            return;
        }
        tracing::debug!("Engine state {} -> {}", self.state, next);
        self.state = next;
        self.state_tx.send_replace(next);
        self.emit(EngineEvent::StateChanged(next));
    }

    /// Next output from the current process; pending while there is none.
    pub(crate) async fn next_process_event(&mut self) -> Option<ProcessEvent> {
        match self.process_rx.as_mut() {
            Some(rx) => {
                let event = rx.recv().await;
                if event.is_none() {
                    self.process_rx = None;
                }
                event
            }
            None => std::future::pending().await,
        }
    }

    /// Spawn a fresh engine process and enter `Initializing`.
    pub(crate) async fn launch(&mut self) -> Result<(), EngineError> {
        if self.state.is_live() {
            return Err(EngineError::AlreadyRunning);
        }
        // Leftover from a failed initialization
        self.release_process().await;

        let path = find_engine(&self.config.path);
        self.capabilities = Capabilities::default();
        self.handshake_seen = false;
        self.stopped_searches = 0;

        let (tx, rx) = mpsc::unbounded_channel();
        let process = match EngineProcess::spawn(
            &path,
            &self.config.args,
            self.config.working_dir.as_deref(),
            tx,
        ) {
            Ok(process) => process,
            Err(e) => {
                self.enter_error(e.to_string());
                return Err(e);
            }
        };

        self.process = Some(process);
        self.process_rx = Some(rx);
        self.set_state(EngineState::Initializing);
        Ok(())
    }

    /// Check that `command` may be sent in the current state.
    pub(crate) fn check_legal(&self, command: &UciCommand) -> Result<(), EngineError> {
        let state = self.state;
        let allowed = match command {
            UciCommand::Uci => state == EngineState::Initializing,
            UciCommand::Debug(_)
            | UciCommand::IsReady
            | UciCommand::Register(_)
            | UciCommand::Quit => state.is_live(),
            UciCommand::SetOption { .. } => self.handshake_seen && state.is_live(),
            UciCommand::Position { .. } | UciCommand::UciNewGame => {
                self.handshake_seen
                    && matches!(state, EngineState::Ready | EngineState::Initializing)
            }
            UciCommand::Go(_) => state == EngineState::Ready,
            UciCommand::Stop | UciCommand::PonderHit => state.is_searching(),
        };

        if allowed {
            Ok(())
        } else {
            Err(EngineError::InvalidCommandForState {
                command: command.keyword(),
                state,
            })
        }
    }

    /// Validate, write and apply the state transition for `command`.
    pub(crate) async fn dispatch(&mut self, command: UciCommand) -> Result<(), EngineError> {
        self.check_legal(&command)?;
        if let UciCommand::SetOption { name, .. } = &command {
            if self.state != EngineState::Initializing && self.capabilities.option(name).is_none() {
                tracing::warn!("Setting option '{}' the engine did not declare", name);
            }
        }

        let process = self.process.as_ref().ok_or(EngineError::NotRunning)?;
        let line = command.to_string();
        process.send(&line).await?;
        self.emit(EngineEvent::RawUciMessage {
            direction: UciMessageDirection::ToEngine,
            message: line,
        });

        match command {
            UciCommand::Go(params) => {
                tracing::info!(ponder = params.ponder, "Engine search started");
                self.set_state(if params.ponder {
                    EngineState::Pondering
                } else {
                    EngineState::Searching
                });
            }
            UciCommand::Stop => {
                self.stopped_searches += 1;
                self.set_state(EngineState::Ready);
            }
            UciCommand::PonderHit if self.state == EngineState::Pondering => {
                self.set_state(EngineState::Searching)
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn mark_ready(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Initializing {
            return Err(EngineError::InvalidCommandForState {
                command: "isready",
                state: self.state,
            });
        }
        self.set_state(EngineState::Ready);
        Ok(())
    }

    /// Decode one stdout line, apply it, then offer it to the waiter.
    pub(crate) fn handle_line(&mut self, line: String) {
        let parsed = parse_uci_message(&line);
        self.emit(EngineEvent::RawUciMessage {
            direction: UciMessageDirection::FromEngine,
            message: line,
        });

        match parsed {
            Ok(message) => {
                // A stopped search's reply must not complete a newer search
                if self.apply_message(&message) {
                    self.waiter.offer(&message);
                }
            }
            Err(e) => {
                tracing::debug!("Skipping unparsable engine output: {}", e);
                self.emit(EngineEvent::Malformed(e));
            }
        }
    }

    /// Apply `message` to capabilities and state. Returns `false` when the
    /// message belongs to an earlier search and should not reach the waiter.
    fn apply_message(&mut self, message: &UciMessage) -> bool {
        match message {
            UciMessage::Id { name, author } => {
                if let Some(name) = name {
                    tracing::info!("Engine name: {}", name);
                    self.capabilities.name = Some(name.clone());
                }
                if let Some(author) = author {
                    self.capabilities.author = Some(author.clone());
                }
            }
            UciMessage::Option(spec) => {
                tracing::trace!("Engine declared option: {:?}", spec);
                self.capabilities
                    .options
                    .insert(spec.name.clone(), spec.clone());
            }
            UciMessage::UciOk => {
                tracing::debug!("Received uciok");
                self.handshake_seen = true;
            }
            UciMessage::ReadyOk => {
                tracing::debug!("Received readyok");
            }
            UciMessage::BestMove { mv, ponder } => {
                tracing::info!("Received bestmove: {}", mv);
                let stale = self.stopped_searches > 0;
                if stale {
                    self.stopped_searches -= 1;
                } else if self.state.is_searching() {
                    self.set_state(EngineState::Ready);
                }
                self.emit(EngineEvent::BestMove {
                    mv: mv.clone(),
                    ponder: ponder.clone(),
                });
                if stale && self.state.is_searching() {
                    tracing::debug!("Ignoring bestmove of a stopped search");
                    return false;
                }
            }
            UciMessage::Info(info) => {
                self.emit(EngineEvent::Info(info.clone()));
            }
            UciMessage::CopyProtection(status) => {
                if *status == ProtectionStatus::Error {
                    tracing::warn!("Engine copy protection check failed");
                }
                self.emit(EngineEvent::CopyProtection(*status));
            }
            UciMessage::Registration(status) => {
                if *status == ProtectionStatus::Error {
                    tracing::warn!("Engine requires registration");
                }
                self.emit(EngineEvent::Registration(*status));
            }
        }
        true
    }

    /// The process exited without being asked to.
    pub(crate) async fn handle_termination(&mut self, code: Option<i32>) {
        tracing::warn!(?code, "Engine process terminated");
        self.waiter
            .cancel(EngineError::ProcessTerminated { code });
        self.release_process().await;
        self.handshake_seen = false;
        self.stopped_searches = 0;
        if self.state != EngineState::Idle {
            self.set_state(EngineState::Error);
        }
        self.emit(EngineEvent::Terminated { code });
    }

    /// Abort initialization: stop the process and enter `Error`.
    ///
    /// A no-op once the session has left `Initializing`, e.g. because
    /// `shutdown` ran while the handshake was still waiting.
    pub(crate) async fn fail(&mut self, reason: String) {
        if self.state != EngineState::Initializing {
            tracing::debug!("Not failing initialization, session is {}", self.state);
            return;
        }
        self.release_process().await;
        self.handshake_seen = false;
        self.enter_error(reason);
    }

    fn enter_error(&mut self, reason: String) {
        tracing::error!("Engine error: {}", reason);
        self.set_state(EngineState::Error);
        self.emit(EngineEvent::Error(reason));
    }

    /// Stop the engine and return to `Idle`. Safe to call repeatedly.
    pub(crate) async fn shutdown(&mut self) {
        self.waiter
            .cancel(EngineError::ProcessTerminated { code: None });
        if self.state.is_live() {
            if let Err(e) = self.dispatch(UciCommand::Quit).await {
                tracing::debug!("Could not send quit: {}", e);
            }
        }
        self.release_process().await;
        self.handshake_seen = false;
        self.stopped_searches = 0;
        self.set_state(EngineState::Idle);
    }

    async fn release_process(&mut self) {
        self.process_rx = None;
        if let Some(mut process) = self.process.take() {
            process.stop(self.config.stop_policy()).await;
        }
    }
}
