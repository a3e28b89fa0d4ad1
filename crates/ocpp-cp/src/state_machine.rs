//! # Session State Machine
//!
//! Lifecycle of one simulated charge point, from connecting to the central
//! system to closing the connection. Every transition is validated against
//! a fixed table; `Error` and `Closed` are terminal.

use crate::error::{ChargePointError, ChargePointResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Protocol state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    BootPending,
    Booted,
    Authorizing,
    Authorized,
    StartPending,
    Charging,
    StopPending,
    Stopped,
    Closed,
    Error,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Error)
    }

    /// Whether a transaction has been started and not yet confirmed stopped
    pub fn in_transaction(&self) -> bool {
        matches!(self, SessionState::Charging | SessionState::StopPending)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Inputs that move the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTrigger {
    Open,
    TransportOpened,
    BootSent,
    BootAccepted,
    AuthorizeSent,
    AuthorizeAccepted,
    AuthorizeRejected,
    StartSent,
    StartAccepted,
    StopSent,
    StopConfirmed,
    Closed,
    Failed { reason: String },
}

/// Record of an applied transition
#[derive(Debug, Clone, PartialEq)]
pub struct StateTransition {
    pub from_state: SessionState,
    pub to_state: SessionState,
    pub trigger: SessionTrigger,
}

/// State machine for one session
#[derive(Debug)]
pub struct SessionStateMachine {
    current_state: SessionState,
    previous_state: Option<SessionState>,
    transition_history: Vec<StateTransition>,
    max_history_size: usize,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: SessionState::Idle,
            previous_state: None,
            transition_history: Vec::new(),
            max_history_size: 64,
        }
    }

    pub fn current_state(&self) -> SessionState {
        self.current_state
    }

    pub fn previous_state(&self) -> Option<SessionState> {
        self.previous_state
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.transition_history
    }

    /// Target state for `trigger`, if allowed from the current state
    pub fn target(&self, trigger: &SessionTrigger) -> Option<SessionState> {
        use SessionState::*;
        use SessionTrigger as T;

        if self.current_state.is_terminal() {
            return None;
        }

        match (self.current_state, trigger) {
            (_, T::Failed { .. }) => Some(Error),
            (_, T::Closed) => Some(Closed),
            (Idle, T::Open) => Some(Connecting),
            (Connecting, T::TransportOpened) => Some(Connected),
            (Connected, T::BootSent) => Some(BootPending),
            (BootPending, T::BootAccepted) => Some(Booted),
            (Booted, T::AuthorizeSent) => Some(Authorizing),
            (Authorizing, T::AuthorizeAccepted) => Some(Authorized),
            (Authorizing, T::AuthorizeRejected) => Some(Booted),
            (Booted | Authorized, T::StartSent) => Some(StartPending),
            (StartPending, T::StartAccepted) => Some(Charging),
            (Charging, T::StopSent) => Some(StopPending),
            (StopPending, T::StopConfirmed) => Some(Stopped),
            _ => None,
        }
    }

    /// Apply `trigger`, failing if the table does not allow it
    pub fn transition(&mut self, trigger: SessionTrigger) -> ChargePointResult<StateTransition> {
        let Some(to_state) = self.target(&trigger) else {
            warn!(
                "Invalid state transition from {} on {:?}",
                self.current_state, trigger
            );
            return Err(ChargePointError::invalid_operation(format!(
                "{:?} not allowed in state {}",
                trigger, self.current_state
            )));
        };

        let transition = StateTransition {
            from_state: self.current_state,
            to_state,
            trigger,
        };
        debug!(
            "State transition: {} -> {} ({:?})",
            transition.from_state, transition.to_state, transition.trigger
        );

        self.previous_state = Some(self.current_state);
        self.current_state = to_state;

        self.transition_history.push(transition.clone());
        if self.transition_history.len() > self.max_history_size {
            self.transition_history.remove(0);
        }
        Ok(transition)
    }

    pub fn can_transition(&self, trigger: &SessionTrigger) -> bool {
        self.target(trigger).is_some()
    }
}
