use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::Instrument;

use super::commands::SessionCommand;
use super::state::SessionState;
use super::waiter::PendingWait;
use crate::error::EngineError;
use crate::process::ProcessEvent;
use crate::EngineEvent;

/// The session actor loop.
/// Owns all mutable state. Processes commands and engine output sequentially.
pub(crate) async fn run_session_actor(state: SessionState, cmd_rx: mpsc::Receiver<SessionCommand>) {
    let label = state
        .config
        .label
        .clone()
        .unwrap_or_else(|| state.config.path.display().to_string());
    run_session_actor_inner(state, cmd_rx)
        .instrument(tracing::info_span!("engine_session", label = %label))
        .await;
}

async fn run_session_actor_inner(
    mut state: SessionState,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
) {
    tracing::debug!("Session actor started");

    loop {
        let deadline = state.waiter.deadline();

        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => handle_command(&mut state, cmd).await,
                    None => {
                        tracing::debug!("All session handles dropped");
                        state.shutdown().await;
                        break;
                    }
                }
            }

            Some(event) = state.next_process_event() => {
                handle_process_event(&mut state, event).await;
                // A chatty engine can keep this branch winning past the deadline
                state.waiter.expire();
            }

            () = sleep_until(deadline) => {
                state.waiter.expire();
            }
        }
    }

    tracing::debug!("Session actor exited");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn handle_command(state: &mut SessionState, cmd: SessionCommand) {
    match cmd {
        SessionCommand::Launch { reply } => {
            let result = state.launch().await;
            let _ = reply.send(result);
        }
        SessionCommand::Send { command, reply } => {
            let result = state.dispatch(command).await;
            let _ = reply.send(result);
        }
        SessionCommand::Exchange {
            command,
            predicate,
            timeout,
            reply,
        } => {
            if !state.has_process() {
                let _ = reply.send(Err(EngineError::NotRunning));
                return;
            }
            if let Some(command) = &command {
                if let Err(e) = state.check_legal(command) {
                    let _ = reply.send(Err(e));
                    return;
                }
            }

            // Register before sending so a fast reply cannot be missed
            let wait = PendingWait::new(predicate, timeout, reply);
            if let Err(wait) = state.waiter.register(wait) {
                wait.fail(EngineError::WaitInProgress);
                return;
            }
            if let Some(command) = command {
                if let Err(e) = state.dispatch(command).await {
                    state.waiter.cancel(e);
                }
            }
        }
        SessionCommand::MarkReady { reply } => {
            let _ = reply.send(state.mark_ready());
        }
        SessionCommand::Fail { reason, reply } => {
            state.fail(reason).await;
            let _ = reply.send(());
        }
        SessionCommand::GetCapabilities { reply } => {
            let _ = reply.send(state.capabilities.clone());
        }
        SessionCommand::Shutdown { reply } => {
            state.shutdown().await;
            let _ = reply.send(());
        }
    }
}

async fn handle_process_event(state: &mut SessionState, event: ProcessEvent) {
    match event {
        ProcessEvent::Line(line) => state.handle_line(line),
        ProcessEvent::Diagnostic(line) => {
            tracing::debug!("Engine stderr: {}", line);
            state.emit(EngineEvent::Diagnostic(line));
        }
        ProcessEvent::Terminated { code } => state.handle_termination(code).await,
    }
}
