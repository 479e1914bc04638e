//! Recording freeze collaborator for tests.
//!
//! Counts `freeze` and `thaw` calls so tests can assert that every freeze was
//! paired with a thaw, including on disconnect paths.
//!
//! ```ignore
//! let freeze = Arc::new(RecordingFreeze::new());
//! let mut engine = SessionEngine::new(transport, freeze.clone(), diag, cfg, tx);
//! // ... BREAKPOINT_BEGIN, then disconnect ...
//! assert_eq!(freeze.freezes(), freeze.thaws());
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::application::handle_breakpoints::ExecutionFreeze;

/// Counts calls without doing anything else.
#[derive(Debug, Default)]
pub struct RecordingFreeze {
    freezes: AtomicUsize,
    thaws: AtomicUsize,
}

impl RecordingFreeze {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn freezes(&self) -> usize {
        self.freezes.load(Ordering::SeqCst)
    }

    pub fn thaws(&self) -> usize {
        self.thaws.load(Ordering::SeqCst)
    }

    /// More freezes than thaws have been seen.
    pub fn is_frozen(&self) -> bool {
        self.freezes() > self.thaws()
    }
}

impl ExecutionFreeze for RecordingFreeze {
    fn freeze(&self) {
        self.freezes.fetch_add(1, Ordering::SeqCst);
    }

    fn thaw(&self) {
        self.thaws.fetch_add(1, Ordering::SeqCst);
    }
}
