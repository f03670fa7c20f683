//! Root statistics for one measurement cycle.
//!
//! The root is a recording [`StatNode`] for [`CallSite::root`] plus the
//! cycle's CPU and wall totals, taken by a `record_starting` /
//! `record_stopping` pair. It is the single entry point instrumentation
//! sources write through: they hand over a call path (outermost first) and
//! the root walks it, creating void ancestors as needed.

use parking_lot::Mutex;
use std::sync::Arc;

use super::node::{NodeKind, StatNode};
use crate::domain::{ActivationKey, CallSite, Duration, ProfilerError, Timestamp};

#[derive(Debug, Default, Clone, Copy)]
struct CycleTiming {
    started: Option<(Timestamp, Timestamp)>,
    cpu_time: Duration,
    wall_time: Duration,
}

/// Root of the live statistics tree.
#[derive(Debug)]
pub struct RootStats {
    node: StatNode,
    timing: Mutex<CycleTiming>,
}

impl Default for RootStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RootStats {
    #[must_use]
    pub fn new() -> Self {
        Self {
            node: StatNode::new(CallSite::root(), NodeKind::Recording),
            timing: Mutex::new(CycleTiming::default()),
        }
    }

    /// The root node itself (read by the freezer).
    #[must_use]
    pub fn node(&self) -> &StatNode {
        &self.node
    }

    // ------------------------------------------------------------------------
    // Cycle boundaries
    // ------------------------------------------------------------------------

    /// Mark the start of a cycle with CPU and wall clock readings.
    pub fn record_starting(&self, cpu: Timestamp, wall: Timestamp) {
        self.timing.lock().started = Some((cpu, wall));
    }

    /// Mark the end of a cycle and compute its totals.
    ///
    /// # Errors
    /// Returns [`ProfilerError::NotRunning`] if no start was recorded.
    pub fn record_stopping(&self, cpu: Timestamp, wall: Timestamp) -> Result<(), ProfilerError> {
        let mut timing = self.timing.lock();
        let (cpu_started, wall_started) = timing.started.take().ok_or(ProfilerError::NotRunning)?;
        timing.cpu_time = cpu.saturating_since(cpu_started);
        timing.wall_time = wall.saturating_since(wall_started);
        Ok(())
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.timing.lock().started.is_some()
    }

    #[must_use]
    pub fn cpu_time_total(&self) -> Duration {
        self.timing.lock().cpu_time
    }

    #[must_use]
    pub fn wall_time_total(&self) -> Duration {
        self.timing.lock().wall_time
    }

    /// Reset totals and discard every child.
    pub fn clear(&self) {
        self.node.clear();
        *self.timing.lock() = CycleTiming::default();
    }

    // ------------------------------------------------------------------------
    // Recording API (called from instrumentation sources)
    // ------------------------------------------------------------------------

    /// Record entry into the last call-site of `path`.
    pub fn record_entry(&self, path: &[CallSite], key: ActivationKey, time: Timestamp) {
        if let Some(leaf) = self.ensure_path(path) {
            leaf.record_entry(time, key);
        }
    }

    /// Record exit from the last call-site of `path`.
    ///
    /// Never creates nodes: if the path is unknown the matching entry was
    /// never recorded and the exit is dropped.
    pub fn record_exit(&self, path: &[CallSite], key: ActivationKey, time: Timestamp) {
        if let Some(leaf) = self.find_path(path) {
            leaf.record_exit(time, key);
        }
    }

    /// Record one sample whose innermost frame is the last call-site of `path`.
    pub fn record_sample(&self, path: &[CallSite]) {
        if let Some(leaf) = self.ensure_path(path) {
            leaf.record_hit();
        }
    }

    fn ensure_path(&self, path: &[CallSite]) -> Option<Arc<StatNode>> {
        let (leaf, ancestors) = path.split_last()?;
        let mut parent: Option<Arc<StatNode>> = None;
        for site in ancestors {
            let next = match &parent {
                Some(node) => node.ensure_child(site, NodeKind::Void),
                None => self.node.ensure_child(site, NodeKind::Void),
            };
            parent = Some(next);
        }
        Some(match &parent {
            Some(node) => node.ensure_child(leaf, NodeKind::Recording),
            None => self.node.ensure_child(leaf, NodeKind::Recording),
        })
    }

    fn find_path(&self, path: &[CallSite]) -> Option<Arc<StatNode>> {
        let (first, rest) = path.split_first()?;
        let mut node = self.node.get_child(first)?;
        for site in rest {
            node = node.get_child(site)?;
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(names: &[&str]) -> Vec<CallSite> {
        names.iter().map(|n| CallSite::new(*n, "src/main.rs", 1)).collect()
    }

    #[test]
    fn test_ancestors_are_void_and_leaf_records() {
        let root = RootStats::new();
        let p = path(&["main", "serve", "handle"]);
        root.record_entry(&p, ActivationKey(1), Timestamp(10));
        root.record_exit(&p, ActivationKey(1), Timestamp(40));

        let main = root.node().get_child(&p[0]).expect("main");
        assert_eq!(main.kind(), NodeKind::Void);
        let serve = main.get_child(&p[1]).expect("serve");
        assert_eq!(serve.kind(), NodeKind::Void);
        let handle = serve.get_child(&p[2]).expect("handle");
        assert_eq!(handle.kind(), NodeKind::Recording);
        assert_eq!(handle.own_hits(), 1);
        assert_eq!(handle.recorded_deep_time(), Duration(30));
    }

    #[test]
    fn test_exit_on_unknown_path_creates_nothing() {
        let root = RootStats::new();
        root.record_exit(&path(&["main", "late"]), ActivationKey(1), Timestamp(5));
        assert_eq!(root.node().child_count(), 0);
    }

    #[test]
    fn test_empty_path_is_ignored() {
        let root = RootStats::new();
        root.record_sample(&[]);
        root.record_entry(&[], ActivationKey(1), Timestamp(0));
        assert_eq!(root.node().child_count(), 0);
        assert_eq!(root.node().own_hits(), 0);
    }

    #[test]
    fn test_samples_hit_the_leaf() {
        let root = RootStats::new();
        root.record_sample(&path(&["main", "work"]));
        root.record_sample(&path(&["main", "work"]));
        root.record_sample(&path(&["main"]));
        let main = root.node().get_child(&CallSite::new("main", "src/main.rs", 1)).expect("main");
        assert_eq!(main.own_hits(), 1);
        assert_eq!(main.get_child(&CallSite::new("work", "src/main.rs", 1)).expect("work").own_hits(), 2);
    }

    #[test]
    fn test_cycle_totals() {
        let root = RootStats::new();
        root.record_starting(Timestamp(1_000), Timestamp(10_000));
        assert!(root.is_recording());
        root.record_stopping(Timestamp(1_500), Timestamp(11_000)).expect("started");
        assert_eq!(root.cpu_time_total(), Duration(500));
        assert_eq!(root.wall_time_total(), Duration(1_000));
        assert!(!root.is_recording());
    }

    #[test]
    fn test_stopping_without_start_fails() {
        let root = RootStats::new();
        let err = root.record_stopping(Timestamp(1), Timestamp(1)).unwrap_err();
        assert!(matches!(err, ProfilerError::NotRunning));
    }

    #[test]
    fn test_clear_resets_everything() {
        let root = RootStats::new();
        root.record_starting(Timestamp(0), Timestamp(0));
        root.record_sample(&path(&["a"]));
        root.record_stopping(Timestamp(3), Timestamp(4)).expect("started");
        root.clear();
        assert_eq!(root.node().child_count(), 0);
        assert_eq!(root.cpu_time_total(), Duration::ZERO);
        assert_eq!(root.wall_time_total(), Duration::ZERO);
    }
}
