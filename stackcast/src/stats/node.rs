//! Live statistics node.
//!
//! One node per call-site per call path. A node accumulates `own_hits` and
//! recorded `deep_time` and owns its children keyed by [`CallSite`].
//!
//! # Locking
//!
//! Every node has its own `parking_lot::Mutex`. Each operation takes exactly
//! one node lock for the duration of a field update or child-map update and
//! never calls into another node while holding it. Concurrent
//! `ensure_child` calls at different depths therefore cannot deadlock, and
//! the freezer only ever blocks a writer for one node's copy.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{ActivationKey, CallSite, Duration, Timestamp};

/// Whether a node measures its call-site directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Entries, exits and samples land on this node.
    Recording,
    /// Placeholder for a frame that was never entered under measurement
    /// (the profiler started mid-call, or the frame is deliberately
    /// excluded). It only forwards to its descendants; its deep time is the
    /// sum of theirs.
    Void,
}

/// A point-in-time copy of one node's own fields, taken under its lock.
#[derive(Debug, Clone)]
pub struct NodeReading {
    pub kind: NodeKind,
    pub own_hits: u64,
    pub deep_time: Duration,
    pub children: Vec<Arc<StatNode>>,
}

#[derive(Debug)]
struct NodeState {
    kind: NodeKind,
    own_hits: u64,
    deep_time: Duration,
    /// Open activations: entry timestamp per activation key.
    entered: HashMap<ActivationKey, Timestamp>,
    children: HashMap<CallSite, Arc<StatNode>>,
}

impl NodeState {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            own_hits: 0,
            deep_time: Duration::ZERO,
            entered: HashMap::new(),
            children: HashMap::new(),
        }
    }
}

/// Mutable, lockable accumulator for one call-site.
#[derive(Debug)]
pub struct StatNode {
    site: CallSite,
    state: Mutex<NodeState>,
}

impl StatNode {
    #[must_use]
    pub fn new(site: CallSite, kind: NodeKind) -> Self {
        Self { site, state: Mutex::new(NodeState::new(kind)) }
    }

    #[must_use]
    pub fn site(&self) -> &CallSite {
        &self.site
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.state.lock().kind
    }

    #[must_use]
    pub fn own_hits(&self) -> u64 {
        self.state.lock().own_hits
    }

    /// Deep time as recorded by entry/exit pairs (zero for void nodes).
    #[must_use]
    pub fn recorded_deep_time(&self) -> Duration {
        self.state.lock().deep_time
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.state.lock().children.len()
    }

    /// Look up or create the child for `site`.
    ///
    /// Concurrent calls with the same identity get the same instance. A
    /// `Recording` request for an existing void child upgrades it, so a frame
    /// first seen as an ancestor starts measuring once it is entered directly.
    pub fn ensure_child(&self, site: &CallSite, kind: NodeKind) -> Arc<StatNode> {
        let child = {
            let mut state = self.state.lock();
            if let Some(existing) = state.children.get(site) {
                Arc::clone(existing)
            } else {
                let created = Arc::new(StatNode::new(site.clone(), kind));
                state.children.insert(site.clone(), Arc::clone(&created));
                return created;
            }
        };
        // Parent lock released before touching the child.
        if kind == NodeKind::Recording {
            child.upgrade();
        }
        child
    }

    #[must_use]
    pub fn get_child(&self, site: &CallSite) -> Option<Arc<StatNode>> {
        self.state.lock().children.get(site).cloned()
    }

    /// Record that activation `key` entered this call-site at `time`.
    pub fn record_entry(&self, time: Timestamp, key: ActivationKey) {
        let mut state = self.state.lock();
        if state.kind == NodeKind::Void {
            return;
        }
        state.entered.insert(key, time);
        state.own_hits += 1;
    }

    /// Record that activation `key` left this call-site at `time`.
    ///
    /// An exit with no matching entry is ignored: the entry happened before
    /// measurement started.
    pub fn record_exit(&self, time: Timestamp, key: ActivationKey) {
        let mut state = self.state.lock();
        if let Some(entered_at) = state.entered.remove(&key) {
            state.deep_time += time.saturating_since(entered_at);
        }
    }

    /// Record one sample with execution directly inside this call-site.
    pub fn record_hit(&self) {
        let mut state = self.state.lock();
        state.own_hits += 1;
    }

    /// Copy this node's fields and child list under one short lock.
    #[must_use]
    pub fn read(&self) -> NodeReading {
        let state = self.state.lock();
        NodeReading {
            kind: state.kind,
            own_hits: state.own_hits,
            deep_time: state.deep_time,
            children: state.children.values().cloned().collect(),
        }
    }

    /// Reset counters and discard the whole child map.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let kind = state.kind;
        *state = NodeState::new(kind);
    }

    fn upgrade(&self) {
        let mut state = self.state.lock();
        state.kind = NodeKind::Recording;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(name: &str) -> CallSite {
        CallSite::new(name, "src/lib.rs", 1)
    }

    #[test]
    fn test_ensure_child_returns_same_instance() {
        let root = StatNode::new(CallSite::root(), NodeKind::Recording);
        let a = root.ensure_child(&site("a"), NodeKind::Recording);
        let b = root.ensure_child(&site("a"), NodeKind::Recording);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(root.child_count(), 1);
    }

    #[test]
    fn test_concurrent_ensure_child_agrees() {
        let root = Arc::new(StatNode::new(CallSite::root(), NodeKind::Recording));
        let children: Vec<Arc<StatNode>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let root = Arc::clone(&root);
                    scope.spawn(move || root.ensure_child(&site("hot"), NodeKind::Recording))
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("thread panicked")).collect()
        });
        assert!(children.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(root.child_count(), 1);
    }

    #[test]
    fn test_entry_exit_accumulates() {
        let node = StatNode::new(site("f"), NodeKind::Recording);
        node.record_entry(Timestamp(100), ActivationKey(1));
        node.record_exit(Timestamp(150), ActivationKey(1));
        node.record_entry(Timestamp(200), ActivationKey(1));
        node.record_exit(Timestamp(230), ActivationKey(1));
        assert_eq!(node.own_hits(), 2);
        assert_eq!(node.recorded_deep_time(), Duration(80));
    }

    #[test]
    fn test_overlapping_activations_are_kept_apart() {
        let node = StatNode::new(site("recurse"), NodeKind::Recording);
        node.record_entry(Timestamp(0), ActivationKey(1));
        node.record_entry(Timestamp(10), ActivationKey(2));
        node.record_exit(Timestamp(15), ActivationKey(2));
        node.record_exit(Timestamp(20), ActivationKey(1));
        assert_eq!(node.own_hits(), 2);
        assert_eq!(node.recorded_deep_time(), Duration(25));
    }

    #[test]
    fn test_unmatched_exit_is_ignored() {
        let node = StatNode::new(site("f"), NodeKind::Recording);
        node.record_exit(Timestamp(500), ActivationKey(7));
        assert_eq!(node.own_hits(), 0);
        assert_eq!(node.recorded_deep_time(), Duration::ZERO);
    }

    #[test]
    fn test_backwards_clock_clamps_to_zero() {
        let node = StatNode::new(site("f"), NodeKind::Recording);
        node.record_entry(Timestamp(500), ActivationKey(1));
        node.record_exit(Timestamp(400), ActivationKey(1));
        assert_eq!(node.recorded_deep_time(), Duration::ZERO);
    }

    #[test]
    fn test_void_node_ignores_entries_until_upgraded() {
        let root = StatNode::new(CallSite::root(), NodeKind::Recording);
        let void = root.ensure_child(&site("loop"), NodeKind::Void);
        void.record_entry(Timestamp(0), ActivationKey(1));
        void.record_exit(Timestamp(10), ActivationKey(1));
        assert_eq!(void.own_hits(), 0);
        assert_eq!(void.kind(), NodeKind::Void);

        let same = root.ensure_child(&site("loop"), NodeKind::Recording);
        assert!(Arc::ptr_eq(&void, &same));
        assert_eq!(same.kind(), NodeKind::Recording);
    }

    #[test]
    fn test_clear_discards_children() {
        let node = StatNode::new(CallSite::root(), NodeKind::Recording);
        node.ensure_child(&site("a"), NodeKind::Recording).record_hit();
        node.record_hit();
        node.clear();
        assert_eq!(node.child_count(), 0);
        assert_eq!(node.own_hits(), 0);
    }
}
