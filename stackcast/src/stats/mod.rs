//! Live call-tree statistics
//!
//! Written continuously by instrumentation sources, frozen by the
//! measurement cycle at each stop boundary.
//!
//! ```text
//! RootStats ── StatNode(main) ── StatNode(serve) ── StatNode(handle)
//!    │                                  └────────── StatNode(parse)
//!    └─ cpu_time_total / wall_time_total
//! ```

pub mod node;
pub mod root;

pub use node::{NodeKind, NodeReading, StatNode};
pub use root::RootStats;
