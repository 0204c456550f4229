use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};

use freedns_bot_core::MailboxSession;

use crate::session::FlowAbort;

/// State machine for one registration run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Init,
    MailboxReady,
    AccountSubmitted,
    AwaitingActivation,
    Activated,
    SubdomainReady,
    Done,
    Failed(String),
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Done | FlowState::Failed(_))
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowState::Init => write!(f, "INIT"),
            FlowState::MailboxReady => write!(f, "MAILBOX_READY"),
            FlowState::AccountSubmitted => write!(f, "ACCOUNT_SUBMITTED"),
            FlowState::AwaitingActivation => write!(f, "AWAITING_ACTIVATION"),
            FlowState::Activated => write!(f, "ACTIVATED"),
            FlowState::SubdomainReady => write!(f, "SUBDOMAIN_READY"),
            FlowState::Done => write!(f, "DONE"),
            FlowState::Failed(_) => write!(f, "FAILED"),
        }
    }
}

/// Transition between states with timestamp
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: FlowState,
    pub to: FlowState,
    pub timestamp: DateTime<Utc>,
    pub details: Option<String>,
}

/// Everything one operator's runs share: the mailbox slot, the state of the
/// current run and its cancel switch.
#[derive(Debug)]
pub struct RegistrationSession {
    mailbox: Option<MailboxSession>,
    // Mailbox messages already read by an earlier activation wait
    read_messages: HashSet<String>,
    state: FlowState,
    evidence: Vec<StateTransition>,
    abort: FlowAbort,
    started_at: DateTime<Utc>,
}

impl RegistrationSession {
    pub fn new(abort: FlowAbort) -> Self {
        Self {
            mailbox: None,
            read_messages: HashSet::new(),
            state: FlowState::Init,
            evidence: Vec::new(),
            abort,
            started_at: Utc::now(),
        }
    }

    /// Reset run state for a new flow. The mailbox is kept for reuse.
    pub fn begin_flow(&mut self) {
        self.state = FlowState::Init;
        self.evidence.clear();
        self.started_at = Utc::now();
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.evidence
    }

    pub fn abort(&self) -> &FlowAbort {
        &self.abort
    }

    pub fn mailbox(&self) -> Option<&MailboxSession> {
        self.mailbox.as_ref()
    }

    pub fn set_mailbox(&mut self, mailbox: MailboxSession) {
        self.read_messages.clear();
        self.mailbox = Some(mailbox);
    }

    /// Forget the mailbox so the next run creates a new one
    pub fn clear_mailbox(&mut self) -> Option<MailboxSession> {
        self.read_messages.clear();
        self.mailbox.take()
    }

    /// Ids of messages in the current mailbox that must not be read again
    pub fn read_messages_mut(&mut self) -> &mut HashSet<String> {
        &mut self.read_messages
    }

    /// Transition to a new state
    pub fn transition(&mut self, new_state: FlowState, details: Option<String>) {
        let old_state = std::mem::replace(&mut self.state, new_state);

        self.evidence.push(StateTransition {
            from: old_state,
            to: self.state.clone(),
            timestamp: Utc::now(),
            details,
        });
    }

    /// Get duration since the run started
    pub fn duration(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    /// `INIT -> MAILBOX_READY -> ...` for logs
    pub fn path(&self) -> String {
        let mut states = vec![self
            .evidence
            .first()
            .map(|t| t.from.to_string())
            .unwrap_or_else(|| self.state.to_string())];
        states.extend(self.evidence.iter().map(|t| t.to.to_string()));
        states.join(" -> ")
    }
}
