//! Snapshot codec
//!
//! Turns the live statistics tree into immutable values that can cross
//! threads, the wire and the filesystem.
//!
//! ```text
//! RootStats ──freeze──▶ FrozenSnapshot ──flatten──▶ FlatSnapshot
//!                              │                         │
//!                              └────── Snapshot ─────────┘ ──▶ SNAPSHOT frame
//! ```

pub mod flat;
pub mod frozen;

pub use flat::{FlatSnapshot, FlatStat, Flatten};
pub use frozen::{FrozenSnapshot, FrozenStat};

use serde::{Deserialize, Serialize};

use crate::domain::Duration;

/// The payload of one SNAPSHOT message: a full tree or its flat view.
///
/// Both shapes carry the cycle's `cpu_time_total` / `wall_time_total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "data", rename_all = "snake_case")]
pub enum Snapshot {
    Tree(FrozenSnapshot),
    Flat(FlatSnapshot),
}

impl Snapshot {
    #[must_use]
    pub fn cpu_time(&self) -> Duration {
        match self {
            Self::Tree(tree) => tree.cpu_time(),
            Self::Flat(flat) => flat.cpu_time(),
        }
    }

    #[must_use]
    pub fn wall_time(&self) -> Duration {
        match self {
            Self::Tree(tree) => tree.wall_time(),
            Self::Flat(flat) => flat.wall_time(),
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cpu_usage(&self) -> f64 {
        let wall = self.wall_time().0;
        if wall == 0 {
            0.0
        } else {
            self.cpu_time().0 as f64 / wall as f64
        }
    }

    #[must_use]
    pub fn is_flat(&self) -> bool {
        matches!(self, Self::Flat(_))
    }
}

impl Flatten for Snapshot {
    fn flatten(&self) -> FlatSnapshot {
        match self {
            Self::Tree(tree) => tree.flatten(),
            Self::Flat(flat) => flat.flatten(),
        }
    }
}

impl From<FrozenSnapshot> for Snapshot {
    fn from(tree: FrozenSnapshot) -> Self {
        Self::Tree(tree)
    }
}

impl From<FlatSnapshot> for Snapshot {
    fn from(flat: FlatSnapshot) -> Self {
        Self::Flat(flat)
    }
}
