//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep nanosecond quantities from being mixed up
//! with timestamps, and give the call-site key one canonical shape.

// Display conversions intentionally lose precision
#![allow(clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Call-site identity
///
/// A location in the profiled program: qualified name, source file, line.
/// Two identities are equal iff all three fields match; this is the key for
/// every child lookup in the live tree and the join key when flattening.
///
/// The profiling root has no name and no location ([`CallSite::root`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallSite {
    name: String,
    file: String,
    line: u32,
}

impl CallSite {
    pub fn new(name: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self { name: name.into(), file: file.into(), line }
    }

    /// The distinguished identity of the profiling root.
    #[must_use]
    pub fn root() -> Self {
        Self { name: String::new(), file: String::new(), line: 0 }
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.name.is_empty() && self.file.is_empty() && self.line == 0
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("<root>");
        }
        if self.file.is_empty() {
            return f.write_str(&self.name);
        }
        write!(f, "{} ({}:{})", self.name, self.file, self.line)
    }
}

/// Activation key
///
/// Distinguishes concurrently-overlapping activations of the same call-site
/// (recursion, several threads or tasks inside the same function) so that
/// an exit is matched with its own entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActivationKey(pub u64);

impl ActivationKey {
    /// Key for an activation on the calling thread at the given stack depth.
    #[must_use]
    pub fn current_thread(depth: usize) -> Self {
        let mut hasher = DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        depth.hash(&mut hasher);
        Self(hasher.finish())
    }
}

impl fmt::Display for ActivationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ACT:{:x}", self.0)
    }
}

/// Timestamp in nanoseconds
///
/// Represents a reading of whichever clock the instrumentation source uses
/// (monotonic wall clock or a CPU clock). Only differences are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Time elapsed since `earlier`, clamped at zero if the clock went back.
    #[must_use]
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }

    /// Convert to seconds (f64)
    pub fn as_seconds(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_seconds())
    }
}

/// Duration in nanoseconds
///
/// Integer nanoseconds keep sums exact, so totals survive merging and
/// flattening without rounding drift.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Duration(pub u64);

impl Duration {
    pub const ZERO: Duration = Duration(0);

    #[must_use]
    pub fn saturating_sub(self, other: Duration) -> Duration {
        Duration(self.0.saturating_sub(other.0))
    }

    /// Convert to milliseconds (f64)
    pub fn as_millis(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Convert to seconds (f64)
    pub fn as_seconds(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    /// Convert to microseconds (u64)
    pub fn as_micros(self) -> u64 {
        self.0 / 1_000
    }

    /// `self / count`, zero when `count` is zero.
    #[must_use]
    pub fn per_call(self, count: u64) -> Duration {
        if count == 0 {
            Duration::ZERO
        } else {
            Duration(self.0 / count)
        }
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Sum for Duration {
    fn sum<I: Iterator<Item = Duration>>(iter: I) -> Duration {
        iter.fold(Duration::ZERO, Add::add)
    }
}

impl From<std::time::Duration> for Duration {
    #[allow(clippy::cast_possible_truncation)]
    fn from(d: std::time::Duration) -> Self {
        // u64 nanoseconds covers ~584 years
        Duration(d.as_nanos() as u64)
    }
}

impl From<Duration> for std::time::Duration {
    fn from(d: Duration) -> Self {
        std::time::Duration::from_nanos(d.0)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.as_millis();
        if ms >= 1000.0 {
            write!(f, "{:.2}s", self.as_seconds())
        } else {
            write!(f, "{ms:.2}ms")
        }
    }
}
