//! Session state machine using rust-fsm.
//!
//! This module defines an explicit finite state machine for the session
//! lifecycle, replacing implicit state derivation from storage checks.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │  Uninitialized  │ (initial)
//! └────────┬────────┘
//!          │ StartupLookup
//!          ▼
//! ┌─────────────────┐
//! │     Loading     │
//! └────────┬────────┘
//!          │ SignedIn / SignedOut
//!          ▼
//! ┌─────────────────┐   SignedOut   ┌─────────────────┐
//! │  Authenticated  │ ────────────► │    Anonymous    │
//! └─────────────────┘ ◄──────────── └─────────────────┘
//!                        SignedIn
//! ```
//!
//! `SignedIn` is a self-loop on `Authenticated` so a newer session can
//! overwrite the current one without passing through `Anonymous`.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

// Define the FSM using rust-fsm's declarative macro
// This generates a module `session_machine` with:
// - session_machine::State (enum)
// - session_machine::Input (enum)
// - session_machine::StateMachine (type alias)
state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Uninitialized)

    Uninitialized => {
        StartupLookup => Loading
    },
    Loading => {
        SignedIn => Authenticated,
        SignedOut => Anonymous
    },
    Anonymous => {
        SignedIn => Authenticated,
        SignedOut => Anonymous
    },
    Authenticated => {
        // Self-loop: last write wins when a newer session arrives
        SignedIn => Authenticated,
        SignedOut => Anonymous
    }
}

// Re-export the generated types with clearer names
pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// User-friendly session state for external consumption.
///
/// This is a simplified view of the FSM state for UI purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// Startup lookup has not begun.
    Uninitialized,
    /// Resolving persisted state at startup.
    Loading,
    /// No current session.
    Anonymous,
    /// A session is current.
    Authenticated,
}

impl AuthState {
    /// Returns true if a session is current (Authenticated state only).
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated)
    }

    /// Returns true before the startup lookup has resolved.
    pub fn is_loading(&self) -> bool {
        matches!(self, AuthState::Uninitialized | AuthState::Loading)
    }
}

impl From<&SessionMachineState> for AuthState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Uninitialized => AuthState::Uninitialized,
            SessionMachineState::Loading => AuthState::Loading,
            SessionMachineState::Anonymous => AuthState::Anonymous,
            SessionMachineState::Authenticated => AuthState::Authenticated,
        }
    }
}

/// Payload for auth state change events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStateChangedPayload {
    /// Current auth state.
    pub state: AuthState,
    /// User ID if authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// User email if available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}
