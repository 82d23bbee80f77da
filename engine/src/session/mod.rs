//! Engine session coordination.
//!
//! An actor task owns the protocol state, the capabilities and the engine
//! process. [`EngineSession`] is a cheap, cloneable handle that talks to it
//! over a mailbox, so commands and engine output are applied one at a time.

mod actor;
mod commands;
mod state;
mod waiter;

pub use state::{Capabilities, EngineState};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::uci::{Registration, UciCommand, UciMessage};
use crate::{EngineEvent, GoParams};
use commands::SessionCommand;

const COMMAND_CAPACITY: usize = 32;
const EVENT_CAPACITY: usize = 256;

/// Handle to an engine session.
///
/// Must be created inside a Tokio runtime. The engine is shut down when the
/// last handle is dropped.
#[derive(Clone)]
pub struct EngineSession {
    config: Arc<EngineConfig>,
    cmd_tx: mpsc::Sender<SessionCommand>,
    state_rx: watch::Receiver<EngineState>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl EngineSession {
    /// Start the session actor. No process is spawned until
    /// [`EngineSession::initialize`].
    pub fn new(config: EngineConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (state_tx, state_rx) = watch::channel(EngineState::Idle);

        let state = state::SessionState::new(config.clone(), state_tx, event_tx.clone());
        tokio::spawn(actor::run_session_actor(state, cmd_rx));

        Self {
            config: Arc::new(config),
            cmd_tx,
            state_rx,
            event_tx,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current protocol state.
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    /// Receive best moves, search progress, termination and traffic events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    pub async fn capabilities(&self) -> Result<Capabilities, EngineError> {
        self.request(|reply| SessionCommand::GetCapabilities { reply })
            .await
    }

    /// Launch the engine and run the `uci`/`isready` handshake.
    ///
    /// Identity and option declarations seen during the handshake are
    /// recorded. Configured default options are applied before the
    /// readiness probe. On failure the session ends up in
    /// [`EngineState::Error`] with the process stopped.
    #[tracing::instrument(level = "info", skip(self), fields(engine = %self.config.path.display()))]
    pub async fn initialize(&self) -> Result<(), EngineError> {
        self.request(|reply| SessionCommand::Launch { reply })
            .await??;

        match self.handshake().await {
            Ok(()) => {
                tracing::info!("Engine initialized");
                Ok(())
            }
            Err(e) => {
                tracing::error!("Engine initialization failed: {}", e);
                let _ = self
                    .request(|reply| SessionCommand::Fail {
                        reason: format!("Engine initialization failed: {}", e),
                        reply,
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn handshake(&self) -> Result<(), EngineError> {
        tracing::debug!("Waiting for uciok from engine");
        self.exchange(
            UciCommand::Uci,
            |m| matches!(m, UciMessage::UciOk),
            self.config.init_timeout,
        )
        .await?;

        for (name, value) in &self.config.options {
            tracing::info!("Setting option {} to {}", name, value);
            self.set_option(name, Some(value.as_str())).await?;
        }

        self.is_ready().await?;
        self.request(|reply| SessionCommand::MarkReady { reply })
            .await?
    }

    /// Send `isready` and wait for `readyok`.
    pub async fn is_ready(&self) -> Result<(), EngineError> {
        self.exchange(
            UciCommand::IsReady,
            |m| matches!(m, UciMessage::ReadyOk),
            self.config.command_timeout,
        )
        .await
        .map(|_| ())
    }

    pub async fn set_option(&self, name: &str, value: Option<&str>) -> Result<(), EngineError> {
        self.send(UciCommand::SetOption {
            name: name.to_string(),
            value: value.map(str::to_string),
        })
        .await
    }

    /// Set the position to search from. `None` means the start position.
    ///
    /// Rejected while a search is running.
    pub async fn set_position<I, S>(&self, fen: Option<&str>, moves: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send(UciCommand::Position {
            fen: fen.map(str::to_string),
            moves: moves.into_iter().map(Into::into).collect(),
        })
        .await
    }

    pub async fn new_game(&self) -> Result<(), EngineError> {
        self.send(UciCommand::UciNewGame).await
    }

    pub async fn set_debug(&self, on: bool) -> Result<(), EngineError> {
        self.send(UciCommand::Debug(on)).await
    }

    pub async fn register(&self, registration: Registration) -> Result<(), EngineError> {
        self.send(UciCommand::Register(registration)).await
    }

    /// Start a search. Returns as soon as `go` is written; the result
    /// arrives later as [`EngineEvent::BestMove`].
    pub async fn start_search(&self, params: GoParams) -> Result<(), EngineError> {
        self.send(UciCommand::Go(params)).await
    }

    /// Start a search and wait up to `timeout` for its best move.
    pub async fn search(
        &self,
        params: GoParams,
        timeout: Duration,
    ) -> Result<(String, Option<String>), EngineError> {
        let message = self
            .exchange(
                UciCommand::Go(params),
                |m| matches!(m, UciMessage::BestMove { .. }),
                timeout,
            )
            .await?;
        match message {
            UciMessage::BestMove { mv, ponder } => Ok((mv, ponder)),
            _ => unreachable!("predicate only accepts bestmove"),
        }
    }

    /// Stop the running search. The session is `Ready` again immediately;
    /// the final best move still arrives as an event.
    pub async fn stop_search(&self) -> Result<(), EngineError> {
        self.send(UciCommand::Stop).await
    }

    pub async fn ponder_hit(&self) -> Result<(), EngineError> {
        self.send(UciCommand::PonderHit).await
    }

    /// Wait for the next engine message matching `predicate`.
    ///
    /// Messages that do not match are still applied to the session. Only
    /// one wait may be outstanding at a time.
    pub async fn wait_for<F>(&self, predicate: F, timeout: Duration) -> Result<UciMessage, EngineError>
    where
        F: Fn(&UciMessage) -> bool + Send + Sync + 'static,
    {
        self.request(|reply| SessionCommand::Exchange {
            command: None,
            predicate: Box::new(predicate),
            timeout,
            reply,
        })
        .await?
    }

    /// Stop the engine and return to `Idle`. Capabilities are kept until the
    /// next [`EngineSession::initialize`].
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        tracing::info!("Shutting down engine session");
        self.request(|reply| SessionCommand::Shutdown { reply })
            .await
    }

    async fn send(&self, command: UciCommand) -> Result<(), EngineError> {
        self.request(|reply| SessionCommand::Send { command, reply })
            .await?
    }

    async fn exchange<F>(
        &self,
        command: UciCommand,
        predicate: F,
        timeout: Duration,
    ) -> Result<UciMessage, EngineError>
    where
        F: Fn(&UciMessage) -> bool + Send + Sync + 'static,
    {
        self.request(|reply| SessionCommand::Exchange {
            command: Some(command),
            predicate: Box::new(predicate),
            timeout,
            reply,
        })
        .await?
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| EngineError::SessionClosed)?;
        rx.await.map_err(|_| EngineError::SessionClosed)
    }
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("engine", &self.config.path)
            .field("state", &self.state())
            .finish()
    }
}
