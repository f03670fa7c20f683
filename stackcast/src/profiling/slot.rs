//! Process-wide instrumentation slot.
//!
//! At most one instrumentation source may feed a process's statistics at a
//! time; two would double-count every call. Sources claim the slot when they
//! start and hold a [`SlotGuard`] until they stop. The guard frees the slot
//! on every exit path, including early returns and panics.

use parking_lot::Mutex;
use stackcast_common::SourceKind;

use crate::domain::ProfilerError;

static PROCESS_SLOT: InstrumentationSlot = InstrumentationSlot::new();

/// A single-occupancy slot for an active instrumentation source.
#[derive(Debug)]
pub struct InstrumentationSlot {
    active: Mutex<Option<SourceKind>>,
}

impl InstrumentationSlot {
    /// A fresh, unoccupied slot. Production code uses [`Self::process`].
    #[must_use]
    pub const fn new() -> Self {
        Self { active: parking_lot::const_mutex(None) }
    }

    /// The slot shared by the whole process.
    #[must_use]
    pub fn process() -> &'static Self {
        &PROCESS_SLOT
    }

    /// Claim the slot for `kind`.
    ///
    /// # Errors
    /// Returns [`ProfilerError::AlreadyActive`] naming the current occupant.
    pub fn acquire(&'static self, kind: SourceKind) -> Result<SlotGuard, ProfilerError> {
        let mut active = self.active.lock();
        if let Some(current) = *active {
            return Err(ProfilerError::AlreadyActive(current));
        }
        *active = Some(kind);
        Ok(SlotGuard { slot: self, kind })
    }

    /// Kind of the source currently holding the slot.
    #[must_use]
    pub fn active(&self) -> Option<SourceKind> {
        *self.active.lock()
    }
}

impl Default for InstrumentationSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of slot ownership; frees the slot on drop.
#[derive(Debug)]
#[must_use = "the slot is released as soon as the guard is dropped"]
pub struct SlotGuard {
    slot: &'static InstrumentationSlot,
    kind: SourceKind,
}

impl SlotGuard {
    #[must_use]
    pub fn kind(&self) -> SourceKind {
        self.kind
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        *self.slot.active.lock() = None;
    }
}
