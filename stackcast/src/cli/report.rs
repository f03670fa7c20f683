//! Headless rendering of snapshots.
//!
//! Plain-text stand-ins for the hotspot panel: one header line with the
//! cycle totals, then either a ranked flat table or an indented call tree.
//!
//! ```text
//! cycle: cpu 1.20s / wall 5.00s (24.0%)
//!    42.3%  ████░░░░░░    508.00ms      12  render::layout  src/render.rs:88
//! ```

// Bars and percentages convert counts to f64
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use std::io::{self, Write};

use stackcast_common::SourceKind;

use crate::analysis::{analyze_hotspots, FunctionHotspot};
use crate::snapshot::{Flatten, FrozenSnapshot, FrozenStat, Snapshot};

const BAR_WIDTH: usize = 10;

/// Maximum function name width before truncation.
const NAME_WIDTH: usize = 40;

fn bar(percentage: f64) -> String {
    let filled = ((percentage / 100.0) * BAR_WIDTH as f64).round().clamp(0.0, BAR_WIDTH as f64) as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

/// Truncate a string for display, adding "..." if too long
fn truncate_for_display(s: &str, max_len: usize) -> String {
    if s.chars().count() > max_len {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    } else {
        s.to_string()
    }
}

/// Cycle totals line.
///
/// # Errors
/// Write failures.
pub fn write_header<W: Write>(out: &mut W, snapshot: &Snapshot) -> io::Result<()> {
    writeln!(
        out,
        "cycle: cpu {} / wall {} ({:.1}%)",
        snapshot.cpu_time(),
        snapshot.wall_time(),
        snapshot.cpu_usage() * 100.0
    )
}

/// Header plus up to `top` rows, flat or as a tree.
///
/// A flat snapshot is always shown flat.
///
/// # Errors
/// Write failures.
pub fn write_snapshot<W: Write>(out: &mut W, snapshot: &Snapshot, flat: bool, top: usize) -> io::Result<()> {
    write_header(out, snapshot)?;
    match snapshot {
        Snapshot::Tree(tree) if !flat => write_tree(out, tree, top),
        _ => write_hotspots(out, &analyze_hotspots(&snapshot.flatten()), top),
    }
}

/// Ranked table of the hottest functions.
///
/// # Errors
/// Write failures.
pub fn write_hotspots<W: Write>(out: &mut W, hotspots: &[FunctionHotspot], top: usize) -> io::Result<()> {
    if hotspots.is_empty() {
        return writeln!(out, "  (no samples)");
    }
    for hotspot in hotspots.iter().take(top) {
        writeln!(
            out,
            "  {:>5.1}%  {}  {:>10} {:>7}  {}  {}",
            hotspot.percentage,
            bar(hotspot.percentage),
            hotspot.own_time.to_string(),
            hotspot.own_hits,
            truncate_for_display(hotspot.name(), NAME_WIDTH),
            hotspot.location(),
        )?;
    }
    if hotspots.len() > top {
        writeln!(out, "  ... {} more", hotspots.len() - top)?;
    }
    Ok(())
}

/// Indented call tree in display order, cut after `top` rows.
///
/// # Errors
/// Write failures.
pub fn write_tree<W: Write>(out: &mut W, tree: &FrozenSnapshot, top: usize) -> io::Result<()> {
    if tree.is_empty() {
        return writeln!(out, "  (no samples)");
    }
    let root = tree.root();
    let total_time = root.deep_time.0;
    let total_hits = root.deep_hits;

    let mut pending: Vec<(&FrozenStat, usize)> = tree.children(root).map(|c| (c, 0)).collect();
    pending.reverse();
    let mut rows = 0;
    while let Some((stat, depth)) = pending.pop() {
        if rows == top {
            writeln!(out, "  ...")?;
            break;
        }
        rows += 1;

        let percentage = if total_time > 0 {
            stat.deep_time.0 as f64 / total_time as f64 * 100.0
        } else if total_hits > 0 {
            stat.deep_hits as f64 / total_hits as f64 * 100.0
        } else {
            0.0
        };
        writeln!(
            out,
            "  {:>5.1}%  {:>10} {:>7}  {}{}",
            percentage,
            stat.deep_time.to_string(),
            stat.deep_hits,
            "  ".repeat(depth),
            truncate_for_display(stat.site.name(), NAME_WIDTH),
        )?;

        let first = pending.len();
        pending.extend(tree.children(stat).map(|c| (c, depth + 1)));
        pending[first..].reverse();
    }
    Ok(())
}

/// Summary of a loaded dump.
///
/// # Errors
/// Write failures.
pub fn write_summary<W: Write>(
    out: &mut W,
    source_kind: SourceKind,
    snapshot: &Snapshot,
    top: usize,
) -> io::Result<()> {
    writeln!(out, "source: {source_kind}")?;
    match snapshot {
        Snapshot::Tree(tree) => {
            writeln!(out, "shape: tree ({} call paths, depth {})", tree.len() - 1, tree.depth())?;
        }
        Snapshot::Flat(flat) => writeln!(out, "shape: flat ({} functions)", flat.len())?,
    }
    write_header(out, snapshot)?;
    write_hotspots(out, &analyze_hotspots(&snapshot.flatten()), top)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CallSite;
    use crate::stats::RootStats;

    fn tree() -> FrozenSnapshot {
        let root = RootStats::new();
        let main = CallSite::new("main", "src/main.rs", 3);
        let hot = CallSite::new("hot", "src/hot.rs", 9);
        let cold = CallSite::new("cold", "src/cold.rs", 1);
        for _ in 0..3 {
            root.record_sample(&[main.clone(), hot.clone()]);
        }
        root.record_sample(&[main, cold]);
        FrozenSnapshot::freeze(&root)
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut out = Vec::new();
        f(&mut out).expect("write");
        String::from_utf8(out).expect("utf-8")
    }

    #[test]
    fn test_bar() {
        assert_eq!(bar(0.0), "░░░░░░░░░░");
        assert_eq!(bar(50.0), "█████░░░░░");
        assert_eq!(bar(100.0), "██████████");
        assert_eq!(bar(250.0), "██████████");
    }

    #[test]
    fn test_truncate_for_display() {
        assert_eq!(truncate_for_display("short", 10), "short");
        assert_eq!(truncate_for_display("a_rather_long_name", 10), "a_rathe...");
    }

    #[test]
    fn test_tree_rows_in_display_order() {
        let text = render(|out| write_tree(out, &tree(), 10));
        let names: Vec<&str> = text.lines().map(|l| l.trim_end().rsplit("  ").next().unwrap_or("")).collect();
        assert_eq!(names, ["main", "hot", "cold"]);
        assert!(text.lines().nth(1).is_some_and(|l| l.ends_with("    hot")));
    }

    #[test]
    fn test_tree_cut_after_top_rows() {
        let text = render(|out| write_tree(out, &tree(), 2));
        assert_eq!(text.lines().count(), 3);
        assert!(text.ends_with("  ...\n"));
    }

    #[test]
    fn test_flat_table() {
        let snapshot = Snapshot::Tree(tree());
        let text = render(|out| write_snapshot(out, &snapshot, true, 1));
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("cycle: "));
        assert!(lines[1].contains("75.0%"));
        assert!(lines[1].contains("hot"));
        assert!(lines[1].ends_with("src/hot.rs:9"));
        assert_eq!(lines[2], "  ... 2 more");
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = Snapshot::Tree(FrozenSnapshot::freeze(&RootStats::new()));
        let text = render(|out| write_snapshot(out, &snapshot, false, 5));
        assert!(text.ends_with("  (no samples)\n"));
    }

    #[test]
    fn test_summary() {
        let snapshot = Snapshot::Tree(tree());
        let text = render(|out| write_summary(out, SourceKind::ThreadSampling, &snapshot, 3));
        assert!(text.starts_with("source: "));
        assert!(text.contains("shape: tree (3 call paths, depth 2)"));
    }
}
