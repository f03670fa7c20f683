//! Hotspot analysis for flattened snapshots.
//!
//! Ranks call-sites by the time spent in their own body, which is what a
//! sampling profile's "self" column shows.
//!
//! ```text
//! HOTSPOTS (cpu 1.20s / wall 5.00s, 24%)
//! ─────────────────────────────────────────────
//!   render::layout      src/render.rs:88   42.3%  ████████░░
//!   json::to_string     src/json.rs:12     18.7%  ███░░░░░░░
//! ```

// Percentage calculations intentionally convert u64 to f64
#![allow(clippy::cast_precision_loss)]

use std::cmp::Reverse;

use crate::domain::{CallSite, Duration};
use crate::snapshot::FlatSnapshot;

/// One ranked call-site.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionHotspot {
    pub site: CallSite,
    pub own_hits: u64,
    pub deep_hits: u64,
    pub own_time: Duration,
    pub deep_time: Duration,

    /// Share of the snapshot's total own time (0.0 - 100.0).
    ///
    /// Sampling sources record no time; their share is computed from own
    /// hits instead.
    pub percentage: f64,
}

impl FunctionHotspot {
    #[must_use]
    pub fn name(&self) -> &str {
        self.site.name()
    }

    /// `file:line`, or `-` when the call-site has no location.
    #[must_use]
    pub fn location(&self) -> String {
        if self.site.file().is_empty() {
            "-".to_string()
        } else {
            format!("{}:{}", self.site.file(), self.site.line())
        }
    }
}

/// Rank every call-site of `snapshot`, hottest first.
///
/// Sorted by own time, then own hits, then call-site so the order is
/// stable across identical snapshots.
#[must_use]
pub fn analyze_hotspots(snapshot: &FlatSnapshot) -> Vec<FunctionHotspot> {
    let total_time: u64 = snapshot.stats().iter().map(|s| s.own_time.0).sum();
    let total_hits: u64 = snapshot.stats().iter().map(|s| s.own_hits).sum();

    let mut hotspots: Vec<FunctionHotspot> = snapshot
        .stats()
        .iter()
        .map(|stat| {
            let percentage = if total_time > 0 {
                (stat.own_time.0 as f64 / total_time as f64) * 100.0
            } else if total_hits > 0 {
                (stat.own_hits as f64 / total_hits as f64) * 100.0
            } else {
                0.0
            };
            FunctionHotspot {
                site: stat.site.clone(),
                own_hits: stat.own_hits,
                deep_hits: stat.deep_hits,
                own_time: stat.own_time,
                deep_time: stat.deep_time,
                percentage,
            }
        })
        .collect();

    hotspots.sort_by(|a, b| {
        (Reverse(a.own_time), Reverse(a.own_hits), &a.site).cmp(&(
            Reverse(b.own_time),
            Reverse(b.own_hits),
            &b.site,
        ))
    });
    hotspots
}
