use std::time::Duration;

use tokio::sync::oneshot;

use super::state::Capabilities;
use super::waiter::MessagePredicate;
use crate::error::EngineError;
use crate::uci::{UciCommand, UciMessage};

/// Commands sent to the session actor. Each embeds a oneshot for the reply.
pub(crate) enum SessionCommand {
    /// Spawn the engine process and enter `Initializing`.
    Launch {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    /// Fire-and-forget protocol command.
    Send {
        command: UciCommand,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    /// Take the waiter slot, then send `command` if there is one. The reply
    /// carries the first message matching `predicate`.
    Exchange {
        command: Option<UciCommand>,
        predicate: MessagePredicate,
        timeout: Duration,
        reply: oneshot::Sender<Result<UciMessage, EngineError>>,
    },
    /// Initialization finished: `Initializing` becomes `Ready`.
    MarkReady {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    /// Initialization failed: stop the process and enter `Error`.
    Fail {
        reason: String,
        reply: oneshot::Sender<()>,
    },
    GetCapabilities {
        reply: oneshot::Sender<Capabilities>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}
