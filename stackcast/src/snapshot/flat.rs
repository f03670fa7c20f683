//! Flattened snapshots: one row per distinct call-site.
//!
//! Flattening walks a frozen tree breadth-first and merges every
//! occurrence of a call-site (recursion, the same helper reached from
//! several callers) into a single row whose fields are the sums over all
//! occurrences. The root itself is not a call-site and is skipped.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};

use super::frozen::{FrozenSnapshot, FrozenStat};
use crate::domain::{CallSite, Duration};

/// Summed statistics for one call-site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatStat {
    pub site: CallSite,
    pub own_hits: u64,
    pub deep_hits: u64,
    pub own_time: Duration,
    pub deep_time: Duration,
}

impl FlatStat {
    fn empty(site: CallSite) -> Self {
        Self {
            site,
            own_hits: 0,
            deep_hits: 0,
            own_time: Duration::ZERO,
            deep_time: Duration::ZERO,
        }
    }

    /// Add one tree occurrence of this call-site.
    pub fn merge_frozen(&mut self, stat: &FrozenStat) {
        self.own_hits += stat.own_hits;
        self.deep_hits += stat.deep_hits;
        self.own_time += stat.own_time;
        self.deep_time += stat.deep_time;
    }

    /// Add another row for the same call-site.
    pub fn merge(&mut self, other: &FlatStat) {
        self.own_hits += other.own_hits;
        self.deep_hits += other.deep_hits;
        self.own_time += other.own_time;
        self.deep_time += other.deep_time;
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

/// A snapshot with exactly one row per call-site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatSnapshot {
    stats: Vec<FlatStat>,
    cpu_time: Duration,
    wall_time: Duration,
}

impl FlatSnapshot {
    #[must_use]
    pub fn stats(&self) -> &[FlatStat] {
        &self.stats
    }

    #[must_use]
    pub fn get(&self, site: &CallSite) -> Option<&FlatStat> {
        self.stats.iter().find(|s| &s.site == site)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    #[must_use]
    pub fn cpu_time(&self) -> Duration {
        self.cpu_time
    }

    #[must_use]
    pub fn wall_time(&self) -> Duration {
        self.wall_time
    }

    fn from_rows(rows: HashMap<CallSite, FlatStat>, cpu_time: Duration, wall_time: Duration) -> Self {
        let mut stats: Vec<FlatStat> = rows.into_values().collect();
        stats.sort_by(|a, b| {
            (Reverse(a.deep_time), Reverse(a.deep_hits), &a.site)
                .cmp(&(Reverse(b.deep_time), Reverse(b.deep_hits), &b.site))
        });
        Self { stats, cpu_time, wall_time }
    }
}

/// Collapse a snapshot into one row per call-site.
pub trait Flatten {
    fn flatten(&self) -> FlatSnapshot;
}

impl Flatten for FrozenSnapshot {
    fn flatten(&self) -> FlatSnapshot {
        let nodes = self.nodes();
        let mut rows: HashMap<CallSite, FlatStat> = HashMap::new();
        let mut queue: VecDeque<u32> = self.root().children.iter().copied().collect();

        while let Some(index) = queue.pop_front() {
            let stat = &nodes[index as usize];
            rows.entry(stat.site.clone())
                .or_insert_with(|| FlatStat::empty(stat.site.clone()))
                .merge_frozen(stat);
            queue.extend(stat.children.iter().copied());
        }

        FlatSnapshot::from_rows(rows, self.cpu_time(), self.wall_time())
    }
}

impl Flatten for FlatSnapshot {
    /// Re-merge the rows; a well-formed flat snapshot comes back unchanged.
    fn flatten(&self) -> FlatSnapshot {
        let mut rows: HashMap<CallSite, FlatStat> = HashMap::with_capacity(self.stats.len());
        for stat in &self.stats {
            rows.entry(stat.site.clone())
                .or_insert_with(|| FlatStat::empty(stat.site.clone()))
                .merge(stat);
        }
        FlatSnapshot::from_rows(rows, self.cpu_time, self.wall_time)
    }
}
