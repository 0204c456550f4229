/// Per-operator registration sessions and their abort signals
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tracing::info;

use freedns_bot_core::{BotError, UserId};

use crate::orchestrator::RegistrationSession;

/// Read side of a flow's cancel switch
#[derive(Debug, Clone)]
pub struct FlowAbort {
    rx: watch::Receiver<bool>,
}

impl FlowAbort {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the flow is cancelled. Pends forever if the switch is gone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let result = rx.wait_for(|aborted| *aborted).await.map(|_| ());
        if result.is_err() {
            std::future::pending::<()>().await;
        }
    }

    pub fn check(&self) -> Result<(), BotError> {
        if self.is_aborted() {
            Err(BotError::Aborted)
        } else {
            Ok(())
        }
    }
}

pub struct SessionSlot {
    session: Arc<Mutex<RegistrationSession>>,
    abort: watch::Sender<bool>,
}

impl SessionSlot {
    fn new() -> Self {
        let (abort, rx) = watch::channel(false);
        Self {
            session: Arc::new(Mutex::new(RegistrationSession::new(FlowAbort::new(rx)))),
            abort,
        }
    }

    /// Lock the session for a new flow, refusing if one is already running.
    pub fn try_begin(&self) -> Result<OwnedMutexGuard<RegistrationSession>, BotError> {
        let mut guard = self.session.clone().try_lock_owned().map_err(|_| BotError::Busy)?;
        self.abort.send_replace(false);
        guard.begin_flow();
        Ok(guard)
    }

    pub fn is_busy(&self) -> bool {
        self.session.try_lock().is_err()
    }
}

/// One session per operator. Flows for different operators run side by side;
/// a second flow for the same operator is refused while the first runs.
#[derive(Default)]
pub struct SessionRegistry {
    slots: DashMap<UserId, Arc<SessionSlot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, user: &UserId) -> Arc<SessionSlot> {
        self.slots
            .entry(user.clone())
            .or_insert_with(|| Arc::new(SessionSlot::new()))
            .value()
            .clone()
    }

    /// Signal the operator's running flow to stop. Returns false when idle.
    pub fn cancel(&self, user: &UserId) -> bool {
        let Some(slot) = self.slots.get(user).map(|s| s.value().clone()) else {
            return false;
        };
        if !slot.is_busy() {
            return false;
        }
        info!(user = %user, "cancelling running registration");
        slot.abort.send_replace(true);
        true
    }
}
