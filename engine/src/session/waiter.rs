//! Single-slot rendezvous between a caller and the next matching message.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::EngineError;
use crate::uci::UciMessage;

pub(crate) type MessagePredicate = Box<dyn Fn(&UciMessage) -> bool + Send + Sync>;
pub(crate) type WaitReply = oneshot::Sender<Result<UciMessage, EngineError>>;

pub(crate) struct PendingWait {
    predicate: MessagePredicate,
    timeout: Duration,
    deadline: Instant,
    reply: WaitReply,
}

impl PendingWait {
    pub(crate) fn new(predicate: MessagePredicate, timeout: Duration, reply: WaitReply) -> Self {
        Self {
            predicate,
            timeout,
            deadline: Instant::now() + timeout,
            reply,
        }
    }

    pub(crate) fn fail(self, error: EngineError) {
        let _ = self.reply.send(Err(error));
    }
}

/// Holds at most one outstanding wait.
#[derive(Default)]
pub(crate) struct ResponseWaiter {
    slot: Option<PendingWait>,
}

impl ResponseWaiter {
    /// Take the slot, handing the wait back if another caller still holds it.
    ///
    /// A wait whose caller has gone away no longer counts as outstanding.
    pub(crate) fn register(&mut self, wait: PendingWait) -> Result<(), PendingWait> {
        if self.is_pending() {
            return Err(wait);
        }
        self.slot = Some(wait);
        Ok(())
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.slot
            .as_ref()
            .is_some_and(|wait| !wait.reply.is_closed())
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.slot.as_ref().map(|wait| wait.deadline)
    }

    /// Resolve the wait if `message` satisfies its predicate.
    pub(crate) fn offer(&mut self, message: &UciMessage) -> bool {
        let matched = self
            .slot
            .as_ref()
            .is_some_and(|wait| (wait.predicate)(message));
        if !matched {
            return false;
        }
        if let Some(wait) = self.slot.take() {
            let _ = wait.reply.send(Ok(message.clone()));
        }
        true
    }

    /// Fail the wait with `Timeout` once its deadline has passed.
    pub(crate) fn expire(&mut self) {
        let expired = self
            .slot
            .as_ref()
            .is_some_and(|wait| wait.deadline <= Instant::now());
        if !expired {
            return;
        }
        if let Some(wait) = self.slot.take() {
            tracing::debug!("Wait timed out after {:?}", wait.timeout);
            let timeout = wait.timeout;
            wait.fail(EngineError::Timeout(timeout));
        }
    }

    pub(crate) fn cancel(&mut self, error: EngineError) {
        if let Some(wait) = self.slot.take() {
            wait.fail(error);
        }
    }
}
