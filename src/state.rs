//! Session, listening and generation state machines
//!
//! These are the small state values the dispatcher and session manager
//! mutate; the UI and tests read them through [`SharedStatus`] snapshots
//! without holding locks.

use crate::mode::Mode;
use parking_lot::RwLock;
use std::sync::Arc;

/// Lifecycle state of the realtime session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session exists
    #[default]
    Idle,
    /// Start requested, negotiating with the backend
    Connecting,
    /// Channel open, events flowing
    Active,
    /// Stopped; transitions back to idle immediately
    Closed,
}

impl SessionStatus {
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionStatus::Idle)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Active)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "Idle"),
            SessionStatus::Connecting => write!(f, "Connecting"),
            SessionStatus::Active => write!(f, "Active"),
            SessionStatus::Closed => write!(f, "Closed"),
        }
    }
}

/// Voice listening pause state with its auto-resume flag
///
/// Pausing while a response is being generated arms auto-resume: the
/// pause is lifted automatically once that response completes. A manual
/// resume disarms it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListeningState {
    paused: bool,
    paused_during_generation: bool,
}

impl ListeningState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// True when a completed response should lift the pause
    pub fn should_auto_resume(&self) -> bool {
        self.paused && self.paused_during_generation
    }

    /// Pause listening; `generating` arms the auto-resume flag
    pub fn pause(&mut self, generating: bool) {
        self.paused = true;
        if generating {
            self.paused_during_generation = true;
        }
    }

    /// Manual resume clears the pause and disarms auto-resume
    pub fn resume_manual(&mut self) {
        self.paused = false;
        self.paused_during_generation = false;
    }

    /// Fire the auto-resume exactly once
    ///
    /// Returns true if the pause was lifted; false if the state had
    /// already changed (manual resume, or never armed).
    pub fn auto_resume(&mut self) -> bool {
        if self.should_auto_resume() {
            self.paused = false;
            self.paused_during_generation = false;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Outstanding response-request state
///
/// At most one response-request may be in flight; new triggers are
/// suppressed while this is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GenerationState {
    in_flight: bool,
}

impl GenerationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn begin(&mut self) {
        self.in_flight = true;
    }

    pub fn clear(&mut self) {
        self.in_flight = false;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Read-only status snapshot published for the UI
#[derive(Clone, Debug, Default)]
pub struct StatusSnapshot {
    pub session: SessionStatus,
    pub mode: Mode,
    pub speech_active: bool,
    pub paused: bool,
    pub generating: bool,
    pub blocked: bool,
    pub running_cost: f64,
    pub response_count: u32,
    pub last_error: Option<String>,
}

/// Thread-safe shared status handle
///
/// The runtime publishes a fresh snapshot after each processed event;
/// readers never observe a half-updated state.
#[derive(Clone, Default)]
pub struct SharedStatus {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: StatusSnapshot) {
        *self.inner.write() = snapshot;
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.read().clone()
    }

    pub fn is_session_active(&self) -> bool {
        self.inner.read().session.is_active()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.read().paused
    }

    pub fn is_generating(&self) -> bool {
        self.inner.read().generating
    }

    pub fn is_blocked(&self) -> bool {
        self.inner.read().blocked
    }
}
