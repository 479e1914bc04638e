//! Freeze signal implementations.
//!
//! The engine only needs *something* implementing
//! [`ExecutionFreeze`](crate::application::handle_breakpoints::ExecutionFreeze).
//! The command-line front-end uses [`FreezeFlag`], a shared boolean that other
//! parts of the process can poll before touching the halted target.

pub mod mock;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::application::handle_breakpoints::ExecutionFreeze;

/// Cooperative freeze flag shared by clone.
#[derive(Debug, Clone, Default)]
pub struct FreezeFlag {
    frozen: Arc<AtomicBool>,
}

impl FreezeFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }
}

impl ExecutionFreeze for FreezeFlag {
    fn freeze(&self) {
        debug!("execution frozen");
        self.frozen.store(true, Ordering::SeqCst);
    }

    fn thaw(&self) {
        debug!("execution thawed");
        self.frozen.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handle_breakpoints::FreezeGuard;

    #[test]
    fn test_freeze_flag_follows_guard_lifetime() {
        // Arrange
        let flag = FreezeFlag::new();
        let observer = flag.clone();

        // Act
        let guard = FreezeGuard::acquire(Arc::new(flag));

        // Assert
        assert!(observer.is_frozen());
        drop(guard);
        assert!(!observer.is_frozen());
    }
}
