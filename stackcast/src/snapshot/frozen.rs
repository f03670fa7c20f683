//! Frozen snapshots of the live statistics tree.
//!
//! # Layout
//!
//! A frozen tree is an arena: `nodes[0]` is the root and every node refers
//! to its children by index. Parents always precede their children, so a
//! reverse scan of the arena is a valid post-order. Nothing here recurses,
//! which keeps freezing, serializing and deserializing safe for call trees
//! thousands of frames deep.
//!
//! # Consistency
//!
//! Freezing copies one node at a time under that node's lock, then derives
//! every aggregate in a single bottom-up pass:
//!
//! - `deep_hits = own_hits + Σ child.deep_hits`
//! - `deep_time = Σ child.deep_time` for void nodes, otherwise
//!   `max(recorded, Σ child.deep_time)`
//! - `own_time = deep_time − Σ child.deep_time`
//!
//! so `own_time ≤ deep_time` and `deep_time ≥ Σ child.deep_time` hold for
//! every node of every frozen snapshot.
//!
//! Decoded trees are checked against the layout before they are accepted:
//! a root exists, every child index is in range, follows its parent and has
//! exactly one parent.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::sync::Arc;

use crate::domain::{CallSite, Duration, SnapshotError};
use crate::stats::{NodeKind, RootStats, StatNode};

/// One frozen call-site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenStat {
    pub site: CallSite,
    /// Void nodes forward to their children and were never measured directly.
    pub void: bool,
    pub own_hits: u64,
    pub deep_hits: u64,
    pub own_time: Duration,
    pub deep_time: Duration,
    /// Arena indices, sorted by deep time (descending).
    pub children: Vec<u32>,
}

impl FrozenStat {
    fn from_live(site: CallSite, kind: NodeKind, own_hits: u64, deep_time: Duration) -> Self {
        Self {
            site,
            void: kind == NodeKind::Void,
            own_hits,
            deep_hits: own_hits,
            own_time: Duration::ZERO,
            deep_time,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn deep_time_per_call(&self) -> Duration {
        self.deep_time.per_call(self.deep_hits)
    }

    #[must_use]
    pub fn own_time_per_call(&self) -> Duration {
        self.own_time.per_call(self.own_hits)
    }
}

/// Immutable, lock-free copy of a statistics tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFrozen")]
pub struct FrozenSnapshot {
    nodes: Vec<FrozenStat>,
    cpu_time: Duration,
    wall_time: Duration,
}

/// Wire form of [`FrozenSnapshot`], before the arena is checked.
#[derive(Deserialize)]
struct RawFrozen {
    nodes: Vec<FrozenStat>,
    cpu_time: Duration,
    wall_time: Duration,
}

impl TryFrom<RawFrozen> for FrozenSnapshot {
    type Error = SnapshotError;

    fn try_from(raw: RawFrozen) -> Result<Self, Self::Error> {
        let len = raw.nodes.len();
        if len == 0 {
            return Err(SnapshotError::MissingRoot);
        }
        let mut has_parent = vec![false; len];
        for (parent, node) in raw.nodes.iter().enumerate() {
            for &child in &node.children {
                let index = child as usize;
                if index >= len {
                    return Err(SnapshotError::ChildOutOfRange { parent, child, len });
                }
                if index <= parent {
                    return Err(SnapshotError::ChildBeforeParent { parent, child });
                }
                if std::mem::replace(&mut has_parent[index], true) {
                    return Err(SnapshotError::SharedChild(child));
                }
            }
        }
        Ok(Self { nodes: raw.nodes, cpu_time: raw.cpu_time, wall_time: raw.wall_time })
    }
}

impl FrozenSnapshot {
    /// Freeze the whole tree of a root, including the cycle totals.
    #[must_use]
    pub fn freeze(root: &RootStats) -> Self {
        let mut snapshot = Self::freeze_node(root.node());
        snapshot.cpu_time = root.cpu_time_total();
        snapshot.wall_time = root.wall_time_total();
        snapshot
    }

    /// Freeze the subtree rooted at `node` (no cycle totals).
    #[must_use]
    pub fn freeze_node(node: &StatNode) -> Self {
        let reading = node.read();
        let mut nodes = vec![FrozenStat::from_live(
            node.site().clone(),
            reading.kind,
            reading.own_hits,
            reading.deep_time,
        )];

        // Explicit work list instead of recursion.
        let mut pending: Vec<(Arc<StatNode>, usize)> =
            reading.children.into_iter().map(|child| (child, 0)).collect();

        while let Some((live, parent)) = pending.pop() {
            let reading = live.read();
            let index = nodes.len();
            nodes.push(FrozenStat::from_live(
                live.site().clone(),
                reading.kind,
                reading.own_hits,
                reading.deep_time,
            ));
            nodes[parent].children.push(arena_index(index));
            pending.extend(reading.children.into_iter().map(|child| (child, index)));
        }

        let mut snapshot = Self { nodes, cpu_time: Duration::ZERO, wall_time: Duration::ZERO };
        snapshot.settle();
        snapshot
    }

    /// Derive aggregates bottom-up and order every child list.
    fn settle(&mut self) {
        for index in (0..self.nodes.len()).rev() {
            let (child_hits, child_time) = self.nodes[index].children.iter().fold(
                (0u64, Duration::ZERO),
                |(hits, time), &child| {
                    let child = &self.nodes[child as usize];
                    (hits + child.deep_hits, time + child.deep_time)
                },
            );

            let node = &mut self.nodes[index];
            node.deep_hits = node.own_hits + child_hits;
            node.deep_time = if node.void { child_time } else { node.deep_time.max(child_time) };
            node.own_time = node.deep_time.saturating_sub(child_time);
        }

        let keys: Vec<(Reverse<Duration>, Reverse<u64>, CallSite)> = self
            .nodes
            .iter()
            .map(|n| (Reverse(n.deep_time), Reverse(n.deep_hits), n.site.clone()))
            .collect();
        for node in &mut self.nodes {
            node.children.sort_by(|a, b| keys[*a as usize].cmp(&keys[*b as usize]));
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn root(&self) -> &FrozenStat {
        &self.nodes[0]
    }

    /// Every node, root first, parents before children.
    #[must_use]
    pub fn nodes(&self) -> &[FrozenStat] {
        &self.nodes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Children of `stat`, in display order.
    pub fn children<'a>(&'a self, stat: &'a FrozenStat) -> impl Iterator<Item = &'a FrozenStat> {
        stat.children.iter().map(|&i| &self.nodes[i as usize])
    }

    /// Deepest root-to-leaf path length, counting the root as depth zero.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut depths = vec![0usize; self.nodes.len()];
        let mut deepest = 0;
        for (index, node) in self.nodes.iter().enumerate() {
            for &child in &node.children {
                depths[child as usize] = depths[index] + 1;
                deepest = deepest.max(depths[index] + 1);
            }
        }
        deepest
    }

    #[must_use]
    pub fn cpu_time(&self) -> Duration {
        self.cpu_time
    }

    #[must_use]
    pub fn wall_time(&self) -> Duration {
        self.wall_time
    }

    /// CPU time over wall time for the cycle, zero for an empty cycle.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cpu_usage(&self) -> f64 {
        if self.wall_time.0 == 0 {
            0.0
        } else {
            self.cpu_time.0 as f64 / self.wall_time.0 as f64
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn arena_index(index: usize) -> u32 {
    // A tree with more than 4 billion distinct call paths does not fit in
    // memory long before this truncates.
    index as u32
}
