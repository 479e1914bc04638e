//! Use case: coordinate the three-phase breakpoint hit with the target.
//!
//! # What happens when the target halts? (for beginners)
//!
//! The target does not send "I stopped at line 10" in one message.  It sends:
//!
//! 1. **BREAKPOINT_BEGIN** with the halted location.  From now on the local
//!    side must not poke at the target's state, so execution exploration is
//!    *frozen*.
//! 2. Zero or more **BREAKPOINT_SYNC** messages carrying opaque state
//!    (call stack, locals) for collaborators to consume.
//! 3. **BREAKPOINT_END**.  The local side *thaws* and tells everyone the
//!    target is halted and ready to inspect.
//!
//! There is no transaction id: Sync and End belong to whichever Begin came
//! last.  Every phase message is echoed back as an acknowledgement, which the
//! session engine does after calling into this coordinator.
//!
//! # Freeze as a scoped guard
//!
//! Freezing is modelled as a [`FreezeGuard`]: acquiring it calls
//! [`ExecutionFreeze::freeze`], dropping it calls
//! [`ExecutionFreeze::thaw`].  The coordinator holds the guard between Begin
//! and End, so a disconnect in the middle of a hit (which drops the
//! coordinator's guard) can never leave the collaborator frozen.

use std::collections::HashSet;
use std::sync::Arc;

use scmp_core::BreakpointRef;
use tracing::{debug, info, warn};

use crate::application::events::{emit, EventSender, SessionEvent};

// ── Freeze collaborator ───────────────────────────────────────────────────────

/// Pauses and resumes local interactive exploration of the target.
///
/// Calls are paired: every `freeze` is followed by exactly one `thaw`.
#[cfg_attr(test, mockall::automock)]
pub trait ExecutionFreeze: Send + Sync {
    fn freeze(&self);
    fn thaw(&self);
}

/// Holds the target frozen for as long as it lives.
#[must_use = "dropping the guard thaws immediately"]
pub struct FreezeGuard {
    freeze: Arc<dyn ExecutionFreeze>,
}

impl FreezeGuard {
    /// Freezes `freeze` and returns the guard that will thaw it.
    pub fn acquire(freeze: Arc<dyn ExecutionFreeze>) -> Self {
        freeze.freeze();
        Self { freeze }
    }
}

impl Drop for FreezeGuard {
    fn drop(&mut self) {
        self.freeze.thaw();
    }
}

impl std::fmt::Debug for FreezeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FreezeGuard")
    }
}

// ── Breakpoint registry ───────────────────────────────────────────────────────

/// Key used for lookups: paths compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RegistryKey {
    plugin_id: u16,
    path: String,
    line: u32,
}

impl RegistryKey {
    fn of(bp: &BreakpointRef) -> Self {
        Self {
            plugin_id: bp.plugin_id,
            path: bp.relative_file_path.to_lowercase(),
            line: bp.line,
        }
    }
}

/// Breakpoints the user placed locally.
///
/// Used only to tell a user breakpoint apart from a step or a scripted
/// `break()` when the target halts; the target keeps its own list.
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    keys: HashSet<RegistryKey>,
    // Entries as added, for listing.
    entries: Vec<BreakpointRef>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `bp`.  Returns `false` if an equivalent entry already existed or
    /// the file is unknown.
    pub fn add(&mut self, bp: BreakpointRef) -> bool {
        if !bp.is_file_known() {
            return false;
        }
        if !self.keys.insert(RegistryKey::of(&bp)) {
            return false;
        }
        self.entries.push(bp);
        true
    }

    /// Removes the entry matching `bp`.  Returns `true` if one was removed.
    pub fn remove(&mut self, bp: &BreakpointRef) -> bool {
        let key = RegistryKey::of(bp);
        if !self.keys.remove(&key) {
            return false;
        }
        self.entries.retain(|b| RegistryKey::of(b) != key);
        true
    }

    /// Adds `bp` if absent, removes it if present.  Returns whether it is set
    /// afterwards.
    pub fn toggle(&mut self, bp: BreakpointRef) -> bool {
        if self.remove(&bp) {
            false
        } else {
            self.add(bp)
        }
    }

    /// Whether the target halted on a location the user placed a breakpoint
    /// on.  Always `false` when the target could not map the halt to a file.
    pub fn contains(&self, bp: &BreakpointRef) -> bool {
        bp.is_file_known() && self.keys.contains(&RegistryKey::of(bp))
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.entries.clear();
    }

    /// Entries in insertion order, with the path spelling they were added with.
    pub fn iter(&self) -> impl Iterator<Item = &BreakpointRef> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Coordinator ───────────────────────────────────────────────────────────────

/// Tracks one Begin/Sync/End exchange at a time.
pub struct BreakpointCoordinator {
    freeze: Arc<dyn ExecutionFreeze>,
    guard: Option<FreezeGuard>,
    registry: BreakpointRegistry,
    current: Option<BreakpointRef>,
    is_user_breakpoint: bool,
}

/// Outcome of a BREAKPOINT_BEGIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    Started,
    /// A previous Begin has not been closed by an End.
    AlreadyInProgress,
}

impl BreakpointCoordinator {
    pub fn new(freeze: Arc<dyn ExecutionFreeze>) -> Self {
        Self {
            freeze,
            guard: None,
            registry: BreakpointRegistry::new(),
            current: None,
            is_user_breakpoint: false,
        }
    }

    /// `true` strictly between a Begin and its End.
    pub fn update_in_progress(&self) -> bool {
        self.guard.is_some()
    }

    /// Location of the most recent halt, until execution continues.
    pub fn current(&self) -> Option<&BreakpointRef> {
        self.current.as_ref()
    }

    pub fn is_user_breakpoint(&self) -> bool {
        self.is_user_breakpoint
    }

    pub fn registry(&self) -> &BreakpointRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut BreakpointRegistry {
        &mut self.registry
    }

    /// Phase 1: records the halt location and freezes.
    ///
    /// Emits `BreakpointHitting` then `UpdateBegin`.  Nothing changes when a
    /// previous Begin is still open; the caller treats that as a protocol
    /// violation.
    pub fn begin(&mut self, bp: BreakpointRef, events: &EventSender) -> BeginOutcome {
        if self.update_in_progress() {
            return BeginOutcome::AlreadyInProgress;
        }

        self.is_user_breakpoint = self.registry.contains(&bp);
        info!(
            "breakpoint hitting at {bp} (user breakpoint: {})",
            self.is_user_breakpoint
        );
        emit(
            events,
            SessionEvent::BreakpointHitting {
                breakpoint: bp.clone(),
                is_user_breakpoint: self.is_user_breakpoint,
            },
        );
        self.current = Some(bp);
        self.guard = Some(FreezeGuard::acquire(Arc::clone(&self.freeze)));
        emit(events, SessionEvent::UpdateBegin);
        BeginOutcome::Started
    }

    /// Phase 2: forwards one chunk of halted state.
    pub fn sync(&mut self, payload: Vec<u8>, events: &EventSender) {
        if !self.update_in_progress() {
            warn!("BREAKPOINT_SYNC without BREAKPOINT_BEGIN; ignoring");
            return;
        }
        debug!("breakpoint sync ({} bytes)", payload.len());
        emit(events, SessionEvent::UpdateSync { payload });
    }

    /// Hands the freeze guard to the caller so it can hold it for the rest of
    /// the End handler.  The thaw then happens when the caller's scope ends,
    /// on every exit path.
    pub fn take_freeze(&mut self) -> Option<FreezeGuard> {
        self.guard.take()
    }

    /// Phase 3: closes the exchange.
    ///
    /// `was_open` is whether a Begin was in progress when End arrived (the
    /// caller has usually taken the guard already).  A stray End emits
    /// nothing.
    pub fn end(&mut self, was_open: bool, events: &EventSender) {
        // Release any guard the caller did not take.
        self.guard = None;
        if !was_open {
            warn!("BREAKPOINT_END without BREAKPOINT_BEGIN; ignoring");
            return;
        }
        emit(events, SessionEvent::UpdateEnd);
        info!("target halted");
        emit(
            events,
            SessionEvent::BreakpointHit {
                breakpoint: self.current.clone(),
                is_user_breakpoint: self.is_user_breakpoint,
            },
        );
    }

    /// The target resumed: forget the halt location.
    pub fn resume(&mut self, events: &EventSender) {
        emit(
            events,
            SessionEvent::BreakpointContinue {
                breakpoint: self.current.take(),
            },
        );
        self.is_user_breakpoint = false;
    }

    /// Drops all per-hit state and thaws if frozen.  The registry is kept.
    pub fn release(&mut self) {
        if self.guard.take().is_some() {
            debug!("released freeze on teardown");
        }
        self.current = None;
        self.is_user_breakpoint = false;
    }
}

impl std::fmt::Debug for BreakpointCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakpointCoordinator")
            .field("update_in_progress", &self.update_in_progress())
            .field("current", &self.current)
            .field("is_user_breakpoint", &self.is_user_breakpoint)
            .field("registry", &self.registry)
            .finish()
    }
}
