//! Host clock helpers and the cycle-aligned stream clock.

use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;

#[cfg(target_os = "macos")]
use mach::mach_time::{mach_absolute_time, mach_timebase_info, mach_timebase_info_data_t};

#[cfg(target_os = "macos")]
fn timebase() -> (u64, u64) {
    static TIMEBASE: Lazy<(u64, u64)> = Lazy::new(|| unsafe {
        let mut info = mach_timebase_info_data_t::default();
        mach_timebase_info(&mut info);
        (info.numer as u64, info.denom as u64)
    });
    *TIMEBASE
}

/// Convert a mach host time tick count into nanoseconds.
pub fn host_time_to_ns(host_time: u64) -> u64 {
    #[cfg(target_os = "macos")]
    {
        if host_time == 0 {
            return 0;
        }
        let (numer, denom) = timebase();
        ((host_time as u128 * numer as u128) / denom as u128) as u64
    }
    #[cfg(not(target_os = "macos"))]
    {
        host_time
    }
}

/// Monotonic timestamp in nanoseconds.
pub fn monotonic_timestamp_ns() -> u64 {
    #[cfg(target_os = "macos")]
    {
        let host_time = unsafe { mach_absolute_time() };
        host_time_to_ns(host_time)
    }
    #[cfg(not(target_os = "macos"))]
    {
        static START: Lazy<std::time::Instant> = Lazy::new(std::time::Instant::now);
        let elapsed = START.elapsed();
        (elapsed.as_secs() * 1_000_000_000) + elapsed.subsec_nanos() as u64
    }
}

/// Zero timestamp for the current cycle: the sample position and host time of
/// the most recent cycle boundary since the anchor.
#[derive(Debug, Clone, Copy)]
pub struct ZeroTimestamp {
    /// Sample position of the cycle boundary, counted from the anchor.
    pub sample_time: u64,
    /// Host time of the cycle boundary in nanoseconds.
    pub host_time_ns: u64,
    /// Number of whole cycles elapsed since the anchor.
    pub cycle: u64,
}

/// Derives cycle-aligned zero timestamps from a host-time anchor.
///
/// The anchor is rearmed on every stream start so sample time restarts at 0,
/// then each query snaps elapsed host time down to a whole-cycle boundary.
pub struct CycleClock {
    sample_rate: u32,
    frames_per_cycle: u64,
    anchor_ns: AtomicU64,
}

impl CycleClock {
    /// Create a clock anchored at the current host time.
    pub fn new(sample_rate: u32, frames_per_cycle: usize) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frames_per_cycle: frames_per_cycle.max(1) as u64,
            anchor_ns: AtomicU64::new(monotonic_timestamp_ns()),
        }
    }

    /// Re-anchor at the current host time. Called on stream start.
    pub fn rearm(&self) {
        self.anchor_ns
            .store(monotonic_timestamp_ns(), Ordering::Release);
    }

    /// Host time of the current anchor in nanoseconds.
    pub fn anchor_ns(&self) -> u64 {
        self.anchor_ns.load(Ordering::Acquire)
    }

    /// Compute the zero timestamp for the current host time.
    pub fn zero_timestamp(&self) -> ZeroTimestamp {
        let anchor = self.anchor_ns();
        let elapsed_ns = monotonic_timestamp_ns().saturating_sub(anchor);
        let elapsed_samples =
            (elapsed_ns as u128 * self.sample_rate as u128) / 1_000_000_000u128;
        let cycle = elapsed_samples as u64 / self.frames_per_cycle;
        let sample_time = cycle * self.frames_per_cycle;
        let boundary_ns =
            (sample_time as u128 * 1_000_000_000u128 / self.sample_rate as u128) as u64;
        ZeroTimestamp {
            sample_time,
            host_time_ns: anchor + boundary_ns,
            cycle,
        }
    }
}
