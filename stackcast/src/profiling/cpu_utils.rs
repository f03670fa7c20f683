//! Clock utilities
//!
//! Thin wrappers over `clock_gettime` for the three clocks the profiler
//! reads: the process CPU clock (cycle totals, CPU-time sampling), the
//! calling thread's CPU clock (CPU-time tracing) and a monotonic wall clock.

#![allow(unsafe_code)] // clock_gettime() requires unsafe

use crate::domain::{ProfilerError, Timestamp};

/// Which clock stamps tracing entries and exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Timer {
    /// Monotonic wall clock.
    #[default]
    Wall,
    /// CPU time consumed by the calling thread.
    ThreadCpu,
}

impl Timer {
    /// Read this clock.
    ///
    /// # Errors
    /// Returns [`ProfilerError::Clock`] if the OS rejects the clock id.
    pub fn now(self) -> Result<Timestamp, ProfilerError> {
        match self {
            Self::Wall => monotonic_now(),
            Self::ThreadCpu => thread_cpu_now(),
        }
    }
}

fn read_clock(clock: libc::clockid_t) -> Result<Timestamp, ProfilerError> {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    if unsafe { libc::clock_gettime(clock, &mut ts) } != 0 {
        return Err(ProfilerError::Clock(std::io::Error::last_os_error()));
    }
    // Both fields are non-negative for every clock read here
    #[allow(clippy::cast_sign_loss)]
    let nanos = (ts.tv_sec as u64).saturating_mul(1_000_000_000).saturating_add(ts.tv_nsec as u64);
    Ok(Timestamp(nanos))
}

/// CPU time consumed by the whole process.
///
/// # Errors
/// Returns [`ProfilerError::Clock`] if the clock cannot be read.
pub fn process_cpu_now() -> Result<Timestamp, ProfilerError> {
    read_clock(libc::CLOCK_PROCESS_CPUTIME_ID)
}

/// CPU time consumed by the calling thread.
///
/// # Errors
/// Returns [`ProfilerError::Clock`] if the clock cannot be read.
pub fn thread_cpu_now() -> Result<Timestamp, ProfilerError> {
    read_clock(libc::CLOCK_THREAD_CPUTIME_ID)
}

/// Monotonic wall clock.
///
/// # Errors
/// Returns [`ProfilerError::Clock`] if the clock cannot be read.
pub fn monotonic_now() -> Result<Timestamp, ProfilerError> {
    read_clock(libc::CLOCK_MONOTONIC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_advances() {
        let a = monotonic_now().expect("monotonic clock");
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = monotonic_now().expect("monotonic clock");
        assert!(b > a);
    }

    #[test]
    fn test_cpu_clocks_count_busy_work() {
        let process_before = process_cpu_now().expect("process clock");
        let thread_before = Timer::ThreadCpu.now().expect("thread clock");

        let mut acc = 0u64;
        for i in 0..2_000_000u64 {
            acc = acc.wrapping_mul(31).wrapping_add(i);
        }
        std::hint::black_box(acc);

        assert!(process_cpu_now().expect("process clock") > process_before);
        assert!(Timer::ThreadCpu.now().expect("thread clock") > thread_before);
    }
}
