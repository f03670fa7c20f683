//! # Measurement Cycle Controller
//!
//! Runs the instrumentation source in fixed-length cycles, but only while
//! somebody is watching.
//!
//! ```text
//!            viewer count 0 → 1
//!   Idle ───────────────────────────▶ Measuring ◀──────────┐
//!    ▲                                  │   │               │ viewers remain
//!    │ viewer count 1 → 0               │   │ deadline      │
//!    │ (cycle ends early)               │   ▼               │
//!    └──────────────────────────────────┘  Broadcasting ────┘
//!    └──────────────────────────────────────────┘ no viewers left
//! ```
//!
//! Every cycle boundary stops the source, records the cycle's CPU and wall
//! totals, freezes the root statistics and clears them. The owner (the
//! broadcast server) drives the controller from its reactor: it reports
//! viewer arrivals and departures and calls [`CycleController::end_cycle`]
//! when [`CycleController::deadline`] passes.

use log::info;
use std::sync::Arc;
use tokio::time::Instant;

use stackcast_common::SourceKind;

use super::cpu_utils::{monotonic_now, process_cpu_now};
use super::source::InstrumentationSource;
use crate::domain::ProfilerError;
use crate::snapshot::{Flatten, FrozenSnapshot, Snapshot};
use crate::stats::RootStats;

/// Cycle length and snapshot shape.
#[derive(Debug, Clone, Copy)]
pub struct CycleConfig {
    pub interval: std::time::Duration,
    /// Ship flattened snapshots instead of full trees.
    pub ship_flat: bool,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self { interval: std::time::Duration::from_secs(5), ship_flat: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Measuring,
    Broadcasting,
}

/// Owns the root statistics and the instrumentation source.
pub struct CycleController<S: InstrumentationSource> {
    source: S,
    stats: Arc<RootStats>,
    config: CycleConfig,
    state: CycleState,
    viewers: usize,
    deadline: Option<Instant>,
}

impl<S: InstrumentationSource> CycleController<S> {
    #[must_use]
    pub fn new(source: S, config: CycleConfig) -> Self {
        Self {
            source,
            stats: Arc::new(RootStats::new()),
            config,
            state: CycleState::Idle,
            viewers: 0,
            deadline: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> CycleState {
        self.state
    }

    #[must_use]
    pub fn viewers(&self) -> usize {
        self.viewers
    }

    #[must_use]
    pub fn source_kind(&self) -> SourceKind {
        self.source.kind()
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// When the running cycle is due to end; `None` unless measuring.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    // ------------------------------------------------------------------------
    // Viewer edges
    // ------------------------------------------------------------------------

    /// A viewer connected. Starts measuring on the 0 → 1 edge.
    ///
    /// # Errors
    /// A source that cannot start (e.g. [`ProfilerError::AlreadyActive`]) is
    /// a configuration error; the controller stays idle.
    pub fn viewer_joined(&mut self) -> Result<(), ProfilerError> {
        self.viewers += 1;
        if self.viewers == 1 && self.state == CycleState::Idle {
            self.begin()?;
            info!("Profiling every {:?}...", self.config.interval);
        }
        Ok(())
    }

    /// A viewer disconnected. On the 1 → 0 edge the running cycle ends
    /// early and its snapshot is returned so it can serve the next joiner.
    ///
    /// # Errors
    /// Propagates failures to stop the source or read the clocks.
    pub fn viewer_left(&mut self) -> Result<Option<Snapshot>, ProfilerError> {
        self.viewers = self.viewers.saturating_sub(1);
        if self.viewers > 0 || self.state != CycleState::Measuring {
            return Ok(None);
        }
        let snapshot = self.finish()?;
        self.state = CycleState::Idle;
        info!("Profiler stopped");
        Ok(Some(snapshot))
    }

    // ------------------------------------------------------------------------
    // Cycle boundaries
    // ------------------------------------------------------------------------

    /// Measuring → Broadcasting: stop, freeze, clear.
    ///
    /// # Errors
    /// [`ProfilerError::NotRunning`] if no cycle is running.
    pub fn end_cycle(&mut self) -> Result<Snapshot, ProfilerError> {
        if self.state != CycleState::Measuring {
            return Err(ProfilerError::NotRunning);
        }
        let snapshot = self.finish()?;
        self.state = CycleState::Broadcasting;
        Ok(snapshot)
    }

    /// Broadcasting → Measuring if viewers remain, otherwise → Idle.
    ///
    /// # Errors
    /// Propagates failures to restart the source.
    pub fn resume(&mut self) -> Result<(), ProfilerError> {
        if self.state != CycleState::Broadcasting {
            return Ok(());
        }
        if self.viewers > 0 {
            self.begin()
        } else {
            self.state = CycleState::Idle;
            info!("Profiler stopped");
            Ok(())
        }
    }

    /// Stop measuring without producing a snapshot (server shutdown).
    ///
    /// # Errors
    /// Propagates failures to stop the source.
    pub fn shutdown(&mut self) -> Result<(), ProfilerError> {
        if self.state == CycleState::Measuring {
            self.source.stop()?;
        }
        self.state = CycleState::Idle;
        self.deadline = None;
        Ok(())
    }

    fn begin(&mut self) -> Result<(), ProfilerError> {
        self.stats.clear();
        self.stats.record_starting(process_cpu_now()?, monotonic_now()?);
        if let Err(e) = self.source.start(Arc::clone(&self.stats)) {
            self.stats.clear();
            self.state = CycleState::Idle;
            return Err(e);
        }
        self.state = CycleState::Measuring;
        // An interval past the clock's range never ends on its own.
        self.deadline = Instant::now().checked_add(self.config.interval);
        Ok(())
    }

    fn finish(&mut self) -> Result<Snapshot, ProfilerError> {
        self.deadline = None;
        self.source.stop()?;
        self.stats.record_stopping(process_cpu_now()?, monotonic_now()?)?;
        let frozen = FrozenSnapshot::freeze(&self.stats);
        self.stats.clear();
        Ok(if self.config.ship_flat { Snapshot::Flat(frozen.flatten()) } else { Snapshot::Tree(frozen) })
    }
}

impl<S: InstrumentationSource> Drop for CycleController<S> {
    fn drop(&mut self) {
        if self.source.is_running() {
            let _ = self.source.stop();
        }
    }
}
