#![deny(missing_docs)]

//! Real-time safe loopback transport core built around a lock-free frame ring.
//!
//! A [`FrameRing`](ring::FrameRing) moves interleaved `f32` PCM frames between
//! one producer thread and one consumer thread without locking or allocating on
//! the data path. [`LoopbackStream`] is the owning embedding layer: it holds the
//! ring for one stream, serializes start/stop transitions (resetting the ring on
//! every stopped-to-started edge), anchors the cycle clock, and keeps
//! overrun/underrun accounting for control surfaces. The host I/O cycle driver
//! calls [`LoopbackStream::write_cycle`] and [`LoopbackStream::read_cycle`] once
//! per hardware cycle.

use std::sync::Once;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{info, trace};

use crate::clock::{CycleClock, ZeroTimestamp};
use crate::ring::{FrameRing, RingError};

pub mod clock;
/// Developer-facing control and TUI support.
pub mod control;
pub mod probe;
pub mod ring;

#[cfg(test)]
mod tests;

static TRACING_INIT: Once = Once::new();

/// Install the default `tracing` subscriber once per process.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });
}

/// Stream parameters fixed at creation.
#[derive(Clone, Copy, Debug)]
pub struct StreamConfig {
    /// Sample rate in Hertz.
    pub sample_rate: u32,
    /// Channels per frame.
    pub channels: usize,
    /// Frames delivered per hardware I/O cycle.
    pub frames_per_cycle: usize,
    /// Requested ring capacity in frames (rounded up to a power of two).
    pub ring_frames: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        // 48 kHz stereo with a 512-frame cycle and two seconds of ring.
        Self {
            sample_rate: 48_000,
            channels: 2,
            frames_per_cycle: 512,
            ring_frames: 48_000 * 2,
        }
    }
}

/// Point-in-time stream health snapshot used by control surfaces.
#[derive(Clone, Copy, Debug)]
pub struct StreamStatus {
    /// Whether I/O is running (at least one client started).
    pub running: bool,
    /// Number of clients holding the stream open.
    pub clients: u32,
    /// Sample rate in Hertz.
    pub sample_rate: u32,
    /// Channels per frame.
    pub channels: usize,
    /// Frames per hardware cycle.
    pub frames_per_cycle: usize,
    /// Realized ring capacity in frames.
    pub capacity_frames: usize,
    /// Frames currently queued in the ring.
    pub available_frames: usize,
    /// Ring occupancy in the 0-1 range.
    pub fill: f32,
    /// Cumulative frames accepted from the producer.
    pub frames_written: u64,
    /// Cumulative frames delivered to the consumer.
    pub frames_read: u64,
    /// Cumulative frames dropped because the ring was full.
    pub overrun_frames: u64,
    /// Cumulative frames replaced with silence because the ring was empty.
    pub underrun_frames: u64,
    /// One-cycle latency in milliseconds.
    pub latency_ms: f32,
}

/// Owning stream object around one [`FrameRing`].
///
/// Ownership is explicit and constructor-injected; there is no process-wide
/// singleton. Start/stop transitions are serialized under an internal mutex,
/// which is what makes the destructive [`FrameRing::reset`] on the
/// stopped-to-started edge safe. The cycle entry points stay lock-free.
pub struct LoopbackStream {
    config: StreamConfig,
    ring: FrameRing,
    clock: CycleClock,
    running: AtomicBool,
    clients: AtomicU32,
    frames_written: AtomicU64,
    frames_read: AtomicU64,
    overrun_frames: AtomicU64,
    underrun_frames: AtomicU64,
    lifecycle: Mutex<()>,
}

impl LoopbackStream {
    /// Create a stream with a freshly allocated heap-backed ring.
    pub fn new(config: StreamConfig) -> Result<Self, RingError> {
        let ring = FrameRing::new(config.ring_frames, config.channels)?;
        Ok(Self::with_ring(config, ring))
    }

    /// Create a stream around an existing ring, e.g. one attached to shared
    /// memory via [`FrameRing::from_mmap`].
    pub fn with_ring(config: StreamConfig, ring: FrameRing) -> Self {
        let clock = CycleClock::new(config.sample_rate, config.frames_per_cycle);
        Self {
            config,
            ring,
            clock,
            running: AtomicBool::new(false),
            clients: AtomicU32::new(0),
            frames_written: AtomicU64::new(0),
            frames_read: AtomicU64::new(0),
            overrun_frames: AtomicU64::new(0),
            underrun_frames: AtomicU64::new(0),
            lifecycle: Mutex::new(()),
        }
    }

    /// Stream parameters.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// The underlying ring.
    pub fn ring(&self) -> &FrameRing {
        &self.ring
    }

    /// Whether I/O is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Register a client and start I/O. The first client triggers the
    /// stopped-to-started transition: the cycle clock is re-anchored and the
    /// ring is destructively reset so no stale frames survive. Returns the
    /// client count after registration.
    pub fn start_io(&self) -> u32 {
        let _guard = self.lifecycle.lock();
        let previous = self.clients.fetch_add(1, Ordering::AcqRel);
        if previous == 0 {
            self.clock.rearm();
            self.ring.reset();
            self.running.store(true, Ordering::Release);
            info!(
                sample_rate = self.config.sample_rate,
                channels = self.config.channels,
                capacity_frames = self.ring.capacity_frames(),
                "stream started"
            );
        }
        previous + 1
    }

    /// Deregister a client. The last client stops I/O. Returns the client
    /// count after deregistration.
    pub fn stop_io(&self) -> u32 {
        let _guard = self.lifecycle.lock();
        let previous = self.clients.load(Ordering::Acquire);
        if previous == 0 {
            return 0;
        }
        self.clients.store(previous - 1, Ordering::Release);
        if previous == 1 {
            self.running.store(false, Ordering::Release);
            info!("stream stopped");
        }
        previous - 1
    }

    /// Producer entry point, called once per cycle with interleaved frames.
    /// Delegates to [`FrameRing::write`] and accounts overrun-dropped frames.
    pub fn write_cycle(&self, data: &[f32]) -> usize {
        let frames = data.len() / self.config.channels;
        let written = self.ring.write(data);
        self.frames_written
            .fetch_add(written as u64, Ordering::Relaxed);
        if written < frames {
            let dropped = (frames - written) as u64;
            self.overrun_frames.fetch_add(dropped, Ordering::Relaxed);
            trace!(dropped, "overrun: ring full, newest frames dropped");
        }
        written
    }

    /// Consumer entry point, called once per cycle with an interleaved output
    /// block. Delegates to [`FrameRing::read`] and accounts the silence-filled
    /// underrun tail.
    pub fn read_cycle(&self, out: &mut [f32]) -> usize {
        let requested = out.len() / self.config.channels;
        let read = self.ring.read(out);
        self.frames_read.fetch_add(read as u64, Ordering::Relaxed);
        if read < requested {
            let silenced = (requested - read) as u64;
            self.underrun_frames.fetch_add(silenced, Ordering::Relaxed);
            trace!(silenced, "underrun: ring empty, tail silence-filled");
        }
        read
    }

    /// Zero timestamp of the current cycle, derived from the start anchor.
    pub fn zero_timestamp(&self) -> ZeroTimestamp {
        self.clock.zero_timestamp()
    }

    /// Collect a [`StreamStatus`] snapshot.
    pub fn status(&self) -> StreamStatus {
        let capacity_frames = self.ring.capacity_frames();
        let available_frames = self.ring.available_frames();
        let fill = if capacity_frames == 0 {
            0.0
        } else {
            available_frames as f32 / capacity_frames as f32
        };
        let latency_ms = if self.config.sample_rate == 0 {
            0.0
        } else {
            self.config.frames_per_cycle as f32 / self.config.sample_rate as f32 * 1_000.0
        };

        StreamStatus {
            running: self.is_running(),
            clients: self.clients.load(Ordering::Acquire),
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            frames_per_cycle: self.config.frames_per_cycle,
            capacity_frames,
            available_frames,
            fill,
            frames_written: self.frames_written.load(Ordering::Relaxed),
            frames_read: self.frames_read.load(Ordering::Relaxed),
            overrun_frames: self.overrun_frames.load(Ordering::Relaxed),
            underrun_frames: self.underrun_frames.load(Ordering::Relaxed),
            latency_ms,
        }
    }
}
