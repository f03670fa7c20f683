//! Deterministic tracing: every entry and exit is recorded.
//!
//! The program under measurement holds a cloneable [`Tracer`] and reports
//! call-site entries and exits through it, typically with the RAII
//! [`TraceScope`] guard. The [`TracingSource`] decides whether those
//! reports land anywhere: while it is stopped, a tracer is a cheap no-op.
//!
//! ```text
//! app threads ── Tracer::enter/exit ──▶ RootStats   (only while started)
//!                                          ▲
//! CycleController ── start/stop ── TracingSource
//! ```

use log::warn;
use parking_lot::RwLock;
use std::sync::Arc;

use stackcast_common::SourceKind;

use super::cpu_utils::Timer;
use super::slot::{InstrumentationSlot, SlotGuard};
use super::source::InstrumentationSource;
use crate::domain::{ActivationKey, CallSite, ProfilerError, Timestamp};
use crate::stats::RootStats;

/// Tracing configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracerConfig {
    pub timer: Timer,
}

#[derive(Debug)]
struct TracerShared {
    timer: Timer,
    target: RwLock<Option<Arc<RootStats>>>,
}

impl TracerShared {
    fn record(&self, record: impl FnOnce(&RootStats, Timestamp)) {
        // The read guard is held across the write so `stop` can wait out
        // in-flight records.
        let target = self.target.read();
        let Some(stats) = target.as_ref() else {
            return;
        };
        match self.timer.now() {
            Ok(now) => record(stats, now),
            Err(e) => warn!("Dropping traced event: {e}"),
        }
    }
}

/// Handle used by instrumented code to report entries and exits.
#[derive(Debug, Clone)]
pub struct Tracer {
    shared: Arc<TracerShared>,
}

impl Tracer {
    /// Record entry into the last call-site of `path`.
    pub fn enter(&self, path: &[CallSite], key: ActivationKey) {
        self.shared.record(|stats, now| stats.record_entry(path, key, now));
    }

    /// Record exit from the last call-site of `path`.
    pub fn exit(&self, path: &[CallSite], key: ActivationKey) {
        self.shared.record(|stats, now| stats.record_exit(path, key, now));
    }

    /// Enter `path` now and exit when the returned guard drops.
    ///
    /// The activation key is derived from the current thread and the path
    /// depth. Overlapping activations of one path on one thread (interleaved
    /// tasks) should use [`Tracer::scope_with_key`] instead.
    pub fn scope(&self, path: Vec<CallSite>) -> TraceScope {
        let key = ActivationKey::current_thread(path.len());
        self.scope_with_key(path, key)
    }

    pub fn scope_with_key(&self, path: Vec<CallSite>, key: ActivationKey) -> TraceScope {
        self.enter(&path, key);
        TraceScope { tracer: self.clone(), path, key }
    }

    /// Whether reports currently reach a statistics tree.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.target.read().is_some()
    }
}

/// Records the exit of its call path when dropped.
#[must_use = "the traced call ends when the scope is dropped"]
pub struct TraceScope {
    tracer: Tracer,
    path: Vec<CallSite>,
    key: ActivationKey,
}

impl TraceScope {
    #[must_use]
    pub fn path(&self) -> &[CallSite] {
        &self.path
    }

    /// Path of a call made from inside this scope.
    #[must_use]
    pub fn child_path(&self, site: CallSite) -> Vec<CallSite> {
        let mut path = self.path.clone();
        path.push(site);
        path
    }
}

impl Drop for TraceScope {
    fn drop(&mut self) {
        self.tracer.exit(&self.path, self.key);
    }
}

/// Instrumentation source that routes [`Tracer`] reports into the tree.
#[derive(Debug)]
pub struct TracingSource {
    shared: Arc<TracerShared>,
    slot: &'static InstrumentationSlot,
    guard: Option<SlotGuard>,
}

impl TracingSource {
    #[must_use]
    pub fn new(config: TracerConfig) -> Self {
        Self::with_slot(config, InstrumentationSlot::process())
    }

    /// Use a private slot instead of the process-wide one.
    #[must_use]
    pub fn with_slot(config: TracerConfig, slot: &'static InstrumentationSlot) -> Self {
        Self {
            shared: Arc::new(TracerShared { timer: config.timer, target: RwLock::new(None) }),
            slot,
            guard: None,
        }
    }

    /// A handle for instrumented code. Valid for the source's whole life.
    #[must_use]
    pub fn tracer(&self) -> Tracer {
        Tracer { shared: Arc::clone(&self.shared) }
    }
}

impl InstrumentationSource for TracingSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Tracing
    }

    fn start(&mut self, stats: Arc<RootStats>) -> Result<(), ProfilerError> {
        if self.guard.is_some() {
            return Err(ProfilerError::AlreadyRunning);
        }
        self.guard = Some(self.slot.acquire(SourceKind::Tracing)?);
        *self.shared.target.write() = Some(stats);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ProfilerError> {
        let guard = self.guard.take().ok_or(ProfilerError::NotRunning)?;
        *self.shared.target.write() = None;
        drop(guard);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.guard.is_some()
    }
}

impl Drop for TracingSource {
    fn drop(&mut self) {
        *self.shared.target.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::FrozenSnapshot;

    fn site(name: &str) -> CallSite {
        CallSite::new(name, "src/app.rs", 7)
    }

    #[test]
    fn test_inactive_tracer_records_nothing() {
        static SLOT: InstrumentationSlot = InstrumentationSlot::new();
        let source = TracingSource::with_slot(TracerConfig::default(), &SLOT);
        let tracer = source.tracer();
        assert!(!tracer.is_active());
        drop(tracer.scope(vec![site("main")]));
        assert!(!source.is_running());
    }

    #[test]
    fn test_scopes_build_the_tree() {
        static SLOT: InstrumentationSlot = InstrumentationSlot::new();
        let stats = Arc::new(RootStats::new());
        let mut source = TracingSource::with_slot(TracerConfig::default(), &SLOT);
        let tracer = source.tracer();
        source.start(Arc::clone(&stats)).expect("start");

        {
            let outer = tracer.scope(vec![site("main")]);
            let inner = tracer.scope(outer.child_path(site("work")));
            assert_eq!(inner.path().len(), 2);
        }
        source.stop().expect("stop");
        // Reports after stop are dropped.
        drop(tracer.scope(vec![site("late")]));

        let frozen = FrozenSnapshot::freeze(&stats);
        let main = frozen.children(frozen.root()).next().expect("main");
        assert_eq!(main.site, site("main"));
        assert_eq!(main.own_hits, 1);
        assert_eq!(main.deep_hits, 2);
        assert_eq!(frozen.root().children.len(), 1);
    }

    #[test]
    fn test_start_twice_and_stop_idle() {
        static SLOT: InstrumentationSlot = InstrumentationSlot::new();
        let mut source = TracingSource::with_slot(TracerConfig::default(), &SLOT);
        assert!(matches!(source.stop(), Err(ProfilerError::NotRunning)));
        source.start(Arc::new(RootStats::new())).expect("start");
        assert!(matches!(source.start(Arc::new(RootStats::new())), Err(ProfilerError::AlreadyRunning)));
        assert_eq!(SLOT.active(), Some(SourceKind::Tracing));
        source.stop().expect("stop");
        assert_eq!(SLOT.active(), None);
    }

    #[test]
    fn test_two_sources_share_one_slot() {
        static SLOT: InstrumentationSlot = InstrumentationSlot::new();
        let mut first = TracingSource::with_slot(TracerConfig::default(), &SLOT);
        let mut second = TracingSource::with_slot(TracerConfig::default(), &SLOT);
        first.start(Arc::new(RootStats::new())).expect("start");
        let err = second.start(Arc::new(RootStats::new())).unwrap_err();
        assert!(matches!(err, ProfilerError::AlreadyActive(SourceKind::Tracing)));
        assert!(!second.is_running());
    }
}
