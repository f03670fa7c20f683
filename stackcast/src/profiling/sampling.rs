//! Statistical sampling.
//!
//! A background thread wakes every `interval`, asks a [`StackProvider`] for
//! the current call path of every observed context and records one hit on
//! each path's innermost call-site.
//!
//! ## Triggers
//!
//! - [`SampleTrigger::WallClock`] samples on every tick (thread polling).
//! - [`SampleTrigger::CpuTime`] samples only once the process has burned at
//!   least `interval` of CPU time since the last sample, so an idle process
//!   produces no samples (the behavior of a profiling interval timer).
//!
//! ## Stack Provider
//!
//! [`StackRegistry`] is the provider shipped with the crate: each thread or
//! task registers a [`ContextStack`] and pushes a frame guard per call.

use crossbeam_channel::{bounded, select, tick, Sender};
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use stackcast_common::SourceKind;

use super::cpu_utils::process_cpu_now;
use super::slot::{InstrumentationSlot, SlotGuard};
use super::source::InstrumentationSource;
use crate::domain::{CallSite, Duration, ProfilerError, Timestamp};
use crate::stats::RootStats;

// ============================================================================
// Stack providers
// ============================================================================

/// Supplies the current call path (outermost first) of every observed
/// execution context.
pub trait StackProvider: Send + Sync + 'static {
    /// # Errors
    /// [`ProfilerError::StackUnavailable`] when stacks cannot be read right
    /// now; the sampler logs it and skips the tick.
    fn call_paths(&self) -> Result<Vec<Vec<CallSite>>, ProfilerError>;
}

/// Shared table of per-context shadow stacks.
#[derive(Debug, Default)]
pub struct StackRegistry {
    stacks: Mutex<HashMap<u64, Vec<CallSite>>>,
    next_id: AtomicU64,
}

impl StackRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new execution context (one per thread or task).
    #[must_use]
    pub fn context(self: &Arc<Self>) -> ContextStack {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.stacks.lock().insert(id, Vec::new());
        ContextStack { registry: Arc::clone(self), id }
    }

    /// Number of registered contexts.
    #[must_use]
    pub fn contexts(&self) -> usize {
        self.stacks.lock().len()
    }
}

impl StackProvider for StackRegistry {
    fn call_paths(&self) -> Result<Vec<Vec<CallSite>>, ProfilerError> {
        Ok(self.stacks.lock().values().filter(|stack| !stack.is_empty()).cloned().collect())
    }
}

/// One context's shadow stack; unregisters itself on drop.
#[derive(Debug)]
pub struct ContextStack {
    registry: Arc<StackRegistry>,
    id: u64,
}

impl ContextStack {
    /// Push `site`; it is popped when the returned guard drops.
    pub fn push(&self, site: CallSite) -> FrameGuard<'_> {
        if let Some(stack) = self.registry.stacks.lock().get_mut(&self.id) {
            stack.push(site);
        }
        FrameGuard { context: self }
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.registry.stacks.lock().get(&self.id).map_or(0, Vec::len)
    }
}

impl Drop for ContextStack {
    fn drop(&mut self) {
        self.registry.stacks.lock().remove(&self.id);
    }
}

/// Pops one frame from its context on drop.
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub struct FrameGuard<'a> {
    context: &'a ContextStack,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if let Some(stack) = self.context.registry.stacks.lock().get_mut(&self.context.id) {
            stack.pop();
        }
    }
}

// ============================================================================
// Sampler
// ============================================================================

/// What decides that a tick becomes a sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SampleTrigger {
    #[default]
    WallClock,
    CpuTime,
}

impl SampleTrigger {
    #[must_use]
    pub fn source_kind(self) -> SourceKind {
        match self {
            Self::WallClock => SourceKind::ThreadSampling,
            Self::CpuTime => SourceKind::TimerSampling,
        }
    }
}

/// Sampling configuration.
#[derive(Debug, Clone, Copy)]
pub struct SamplerConfig {
    pub interval: std::time::Duration,
    pub trigger: SampleTrigger,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { interval: std::time::Duration::from_millis(1), trigger: SampleTrigger::WallClock }
    }
}

struct Running {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
    _guard: SlotGuard,
}

/// Instrumentation source sampling a [`StackProvider`] on a background thread.
pub struct Sampler<P: StackProvider> {
    config: SamplerConfig,
    provider: Arc<P>,
    slot: &'static InstrumentationSlot,
    running: Option<Running>,
}

impl<P: StackProvider> Sampler<P> {
    #[must_use]
    pub fn new(config: SamplerConfig, provider: Arc<P>) -> Self {
        Self::with_slot(config, provider, InstrumentationSlot::process())
    }

    /// Use a private slot instead of the process-wide one.
    #[must_use]
    pub fn with_slot(config: SamplerConfig, provider: Arc<P>, slot: &'static InstrumentationSlot) -> Self {
        Self { config, provider, slot, running: None }
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }
}

/// Gate for CPU-time sampling: passes once `interval` of process CPU time
/// has elapsed since the last pass.
struct CpuGate {
    interval: Duration,
    last: Timestamp,
}

impl CpuGate {
    fn passes(&mut self, now: Timestamp) -> bool {
        if now.saturating_since(self.last) >= self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}

fn take_sample<P: StackProvider>(provider: &P, stats: &RootStats) {
    match provider.call_paths() {
        Ok(paths) => {
            for path in &paths {
                stats.record_sample(path);
            }
        }
        Err(e) => warn!("Skipping sample: {e}"),
    }
}

impl<P: StackProvider> InstrumentationSource for Sampler<P> {
    fn kind(&self) -> SourceKind {
        self.config.trigger.source_kind()
    }

    fn start(&mut self, stats: Arc<RootStats>) -> Result<(), ProfilerError> {
        if self.running.is_some() {
            return Err(ProfilerError::AlreadyRunning);
        }
        let guard = self.slot.acquire(self.kind())?;

        let mut gate = match self.config.trigger {
            SampleTrigger::WallClock => None,
            SampleTrigger::CpuTime => Some(CpuGate {
                interval: Duration::from(self.config.interval),
                last: process_cpu_now()?,
            }),
        };
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ticker = tick(self.config.interval);
        let provider = Arc::clone(&self.provider);

        let handle = std::thread::Builder::new()
            .name("stackcast-sampler".to_string())
            .spawn(move || loop {
                let ticked = select! {
                    recv(stop_rx) -> _ => false,
                    recv(ticker) -> _ => true,
                };
                if !ticked {
                    break;
                }
                let due = match gate.as_mut() {
                    None => true,
                    Some(gate) => match process_cpu_now() {
                        Ok(now) => gate.passes(now),
                        Err(e) => {
                            warn!("Skipping sample: {e}");
                            false
                        }
                    },
                };
                if due {
                    take_sample(provider.as_ref(), &stats);
                }
            })
            .map_err(ProfilerError::Spawn)?;

        debug!("Sampler started every {:?} ({})", self.config.interval, self.kind());
        self.running = Some(Running { stop_tx, handle, _guard: guard });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ProfilerError> {
        let running = self.running.take().ok_or(ProfilerError::NotRunning)?;
        // A full channel means a stop is already pending.
        let _ = running.stop_tx.try_send(());
        if running.handle.join().is_err() {
            warn!("Sampler thread panicked");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl<P: StackProvider> Drop for Sampler<P> {
    fn drop(&mut self) {
        if self.running.is_some() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::FrozenSnapshot;

    fn site(name: &str) -> CallSite {
        CallSite::new(name, "src/worker.rs", 1)
    }

    #[test]
    fn test_registry_tracks_frames() {
        let registry = StackRegistry::new();
        let ctx = registry.context();
        {
            let _main = ctx.push(site("main"));
            let _work = ctx.push(site("work"));
            assert_eq!(ctx.depth(), 2);
            let paths = registry.call_paths().expect("paths");
            assert_eq!(paths, vec![vec![site("main"), site("work")]]);
        }
        assert_eq!(ctx.depth(), 0);
        assert!(registry.call_paths().expect("paths").is_empty());
        drop(ctx);
        assert_eq!(registry.contexts(), 0);
    }

    #[test]
    fn test_cpu_gate_waits_for_interval() {
        let mut gate = CpuGate { interval: Duration(100), last: Timestamp(1_000) };
        assert!(!gate.passes(Timestamp(1_050)));
        assert!(gate.passes(Timestamp(1_100)));
        assert!(!gate.passes(Timestamp(1_150)));
        assert!(gate.passes(Timestamp(1_250)));
    }

    #[test]
    fn test_trigger_maps_to_source_kind() {
        assert_eq!(SampleTrigger::WallClock.source_kind(), SourceKind::ThreadSampling);
        assert_eq!(SampleTrigger::CpuTime.source_kind(), SourceKind::TimerSampling);
    }

    #[test]
    fn test_wall_clock_sampler_records_hits() {
        static SLOT: InstrumentationSlot = InstrumentationSlot::new();
        let registry = StackRegistry::new();
        let ctx = registry.context();
        let _main = ctx.push(site("main"));
        let _spin = ctx.push(site("spin"));

        let stats = Arc::new(RootStats::new());
        let config = SamplerConfig { interval: std::time::Duration::from_millis(1), ..SamplerConfig::default() };
        let mut sampler = Sampler::with_slot(config, Arc::clone(&registry), &SLOT);
        sampler.start(Arc::clone(&stats)).expect("start");
        assert_eq!(SLOT.active(), Some(SourceKind::ThreadSampling));
        std::thread::sleep(std::time::Duration::from_millis(50));
        sampler.stop().expect("stop");
        assert_eq!(SLOT.active(), None);

        let frozen = FrozenSnapshot::freeze(&stats);
        let main = frozen.children(frozen.root()).next().expect("main");
        assert!(main.void);
        let spin = frozen.children(main).next().expect("spin");
        assert!(spin.own_hits > 0);
        assert_eq!(frozen.root().deep_hits, spin.own_hits);
    }

    struct Unreadable;

    impl StackProvider for Unreadable {
        fn call_paths(&self) -> Result<Vec<Vec<CallSite>>, ProfilerError> {
            Err(ProfilerError::StackUnavailable("target suspended".to_string()))
        }
    }

    #[test]
    fn test_provider_failure_skips_ticks() {
        static SLOT: InstrumentationSlot = InstrumentationSlot::new();
        let stats = Arc::new(RootStats::new());
        let mut sampler = Sampler::with_slot(SamplerConfig::default(), Arc::new(Unreadable), &SLOT);
        sampler.start(Arc::clone(&stats)).expect("start");
        std::thread::sleep(std::time::Duration::from_millis(20));
        sampler.stop().expect("stop");
        assert!(FrozenSnapshot::freeze(&stats).is_empty());
    }

    #[test]
    fn test_stop_without_start() {
        let mut sampler = Sampler::new(SamplerConfig::default(), StackRegistry::new());
        assert!(matches!(sampler.stop(), Err(ProfilerError::NotRunning)));
    }
}
