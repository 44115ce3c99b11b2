use std::sync::atomic::{AtomicBool, Ordering};

use crate::decoder::ProgressiveDecoder;
use crate::error::TransportError;

use super::presenter::PointerTracker;

pub type SessionId = u64;

/// The half of a session the fetch worker sees.
#[derive(Debug)]
pub struct SessionShared {
    id: SessionId,
    finalized: AtomicBool,
}

impl SessionShared {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            finalized: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Marks the session as cancelled. Returns true on the first call only.
    pub fn finalize(&self) -> bool {
        !self.finalized.swap(true, Ordering::AcqRel)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transfer and decode in progress.
    Active,
    /// Ended while the worker still held it; waiting for the terminal task.
    Finalizing,
    /// Fully decoded and on screen.
    Completed,
}

/// How the worker's part of a session ended.
#[derive(Debug)]
pub enum TransferOutcome {
    Completed,
    Failed(TransportError),
    /// The session was cancelled before the worker started the transfer.
    Skipped,
}

/// UI-thread state for the popup of one session.
pub(crate) struct View<P> {
    pub popup: Option<P>,
    pub pointer: PointerTracker,
}

/// UI-thread half of a session. Lives in the previewer's session table
/// until freed.
pub(crate) struct Session<P> {
    pub shared: std::sync::Arc<SessionShared>,
    pub state: SessionState,
    pub decoder: Option<Box<dyn ProgressiveDecoder>>,
    pub view: View<P>,
}

impl<P> Session<P> {
    pub fn new(
        shared: std::sync::Arc<SessionShared>,
        decoder: Box<dyn ProgressiveDecoder>,
        dismiss_distance: f64,
    ) -> Self {
        Self {
            shared,
            state: SessionState::Active,
            decoder: Some(decoder),
            view: View {
                popup: None,
                pointer: PointerTracker::new(dismiss_distance),
            },
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == SessionState::Completed
    }
}
