//! Lock-free single-producer/single-consumer ring buffer for interleaved audio frames.
//!
//! One writer thread and one reader thread may use a [`FrameRing`] concurrently
//! without locking. The two monotonically increasing frame cursors are the sole
//! synchronization points: the writer publishes `write_cursor` with release
//! semantics after the sample data is in place, and the reader observes it with
//! acquire semantics before copying. Neither side blocks, sleeps, or allocates,
//! which keeps both directions safe inside a deadline-bound audio callback.

use std::cell::UnsafeCell;
use std::collections::TryReserveError;
use std::mem::size_of;
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::{MmapMut, MmapOptions};

/// Errors surfaced while creating a ring. Overrun and underrun are not errors;
/// they resolve through the drop-newest and silence-fill policies on the data path.
#[derive(thiserror::Error, Debug)]
pub enum RingError {
    /// The heap-backed sample store could not be allocated.
    #[error("failed to allocate sample store of {frames} frames x {channels} channels")]
    Allocation {
        /// Requested capacity in frames (after power-of-two rounding).
        frames: usize,
        /// Channel count requested at construction.
        channels: usize,
        /// Underlying allocator failure.
        #[source]
        source: TryReserveError,
    },
    /// The shared-memory sample store could not be mapped.
    #[error("failed to map shared sample store")]
    Map(#[from] std::io::Error),
    /// A shared mapping is too small for the layout its header claims.
    #[error("shared mapping of {actual} bytes cannot back {frames} frames x {channels} channels")]
    Attach {
        /// Capacity in frames claimed by the header.
        frames: usize,
        /// Channel count claimed by the header.
        channels: usize,
        /// Actual byte length of the mapping.
        actual: usize,
    },
}

/// Cursor block stored at the front of a shared memory region so that a peer
/// process can drive its end of the ring without calling back into this crate.
#[repr(C, align(64))]
pub struct RingHeader {
    capacity_frames: u32,
    channels: u32,
    write_cursor: AtomicU64,
    read_cursor: AtomicU64,
}

impl RingHeader {
    fn new(capacity_frames: usize, channels: usize) -> Self {
        Self {
            capacity_frames: capacity_frames as u32,
            channels: channels as u32,
            write_cursor: AtomicU64::new(0),
            read_cursor: AtomicU64::new(0),
        }
    }

    fn capacity_frames(&self) -> usize {
        self.capacity_frames as usize
    }

    fn channels(&self) -> usize {
        self.channels as usize
    }
}

enum RingStorage {
    Local {
        header: UnsafeCell<RingHeader>,
        data: UnsafeCell<Box<[f32]>>,
    },
    Shared {
        mmap: UnsafeCell<MmapMut>,
        header_ptr: *mut RingHeader,
        data_ptr: *mut f32,
    },
}

// Safety: concurrent access is restricted to one writer and one reader, which
// touch disjoint store regions delimited by the atomic cursors.
unsafe impl Send for RingStorage {}
unsafe impl Sync for RingStorage {}

/// Fixed-capacity circular store of interleaved multi-channel `f32` frames.
///
/// Capacity is rounded up to the next power of two at construction. Frames are
/// produced and consumed only as whole units; a partial frame is never
/// observable. Exactly one thread may write and exactly one thread may read at
/// a time; the caller upholds that discipline, the ring assumes it.
pub struct FrameRing {
    storage: RingStorage,
    capacity_frames: usize,
    channels: usize,
}

unsafe impl Send for FrameRing {}
unsafe impl Sync for FrameRing {}

impl FrameRing {
    /// Create a heap-backed ring. `capacity_frames` is rounded up to the next
    /// power of two (never 0); `channels` is clamped to at least 1. The store
    /// is zero-initialized and owned exclusively by the returned ring.
    pub fn new(capacity_frames: usize, channels: usize) -> Result<Self, RingError> {
        let capacity_frames = capacity_frames.max(1).next_power_of_two();
        let channels = channels.max(1);
        let samples = capacity_frames * channels;

        let mut data = Vec::new();
        data.try_reserve_exact(samples)
            .map_err(|source| RingError::Allocation {
                frames: capacity_frames,
                channels,
                source,
            })?;
        data.resize(samples, 0.0f32);

        Ok(Self {
            storage: RingStorage::Local {
                header: UnsafeCell::new(RingHeader::new(capacity_frames, channels)),
                data: UnsafeCell::new(data.into_boxed_slice()),
            },
            capacity_frames,
            channels,
        })
    }

    /// Create an anonymous shared-memory backed ring using `mmap`, laid out as
    /// a [`RingHeader`] followed by the interleaved sample data.
    pub fn new_shared(capacity_frames: usize, channels: usize) -> Result<Self, RingError> {
        let capacity_frames = capacity_frames.max(1).next_power_of_two();
        let channels = channels.max(1);
        let samples = capacity_frames * channels;
        let bytes = size_of::<RingHeader>() + size_of::<f32>() * samples;

        let mut mmap = MmapOptions::new().len(bytes).map_anon()?;
        let header_ptr = mmap.as_mut_ptr() as *mut RingHeader;
        unsafe {
            header_ptr.write(RingHeader::new(capacity_frames, channels));
        }
        let data_ptr = unsafe { mmap.as_mut_ptr().add(size_of::<RingHeader>()) as *mut f32 };

        Ok(Self {
            storage: RingStorage::Shared {
                mmap: UnsafeCell::new(mmap),
                header_ptr,
                data_ptr,
            },
            capacity_frames,
            channels,
        })
    }

    /// Attach to an existing `MmapMut` region that follows the header+data
    /// layout produced by [`new_shared`](Self::new_shared). Capacity and
    /// channel count are read from the header; the region must be large enough
    /// to back them, otherwise [`RingError::Attach`] is returned.
    pub fn from_mmap(mut mmap: MmapMut) -> Result<Self, RingError> {
        if mmap.len() < size_of::<RingHeader>() {
            return Err(RingError::Attach {
                frames: 0,
                channels: 0,
                actual: mmap.len(),
            });
        }
        let header_ptr = mmap.as_mut_ptr() as *mut RingHeader;
        let (capacity_frames, channels) =
            unsafe { ((*header_ptr).capacity_frames(), (*header_ptr).channels()) };
        debug_assert!(
            capacity_frames.is_power_of_two(),
            "shared header carries a non power-of-two capacity"
        );
        let needed =
            size_of::<RingHeader>() + capacity_frames * channels * size_of::<f32>();
        if mmap.len() < needed {
            return Err(RingError::Attach {
                frames: capacity_frames,
                channels,
                actual: mmap.len(),
            });
        }
        let data_ptr = unsafe { mmap.as_mut_ptr().add(size_of::<RingHeader>()) as *mut f32 };
        Ok(Self {
            storage: RingStorage::Shared {
                mmap: UnsafeCell::new(mmap),
                header_ptr,
                data_ptr,
            },
            capacity_frames,
            channels,
        })
    }

    fn header(&self) -> &RingHeader {
        match &self.storage {
            RingStorage::Local { header, .. } => unsafe { &*header.get() },
            RingStorage::Shared { header_ptr, .. } => unsafe { &**header_ptr },
        }
    }

    fn store(&self) -> &[f32] {
        let samples = self.capacity_frames * self.channels;
        match &self.storage {
            RingStorage::Local { data, .. } => unsafe {
                let data: &Box<[f32]> = &*data.get();
                &data[..]
            },
            RingStorage::Shared { mmap, data_ptr, .. } => {
                let mmap = unsafe { &*mmap.get() };
                let data_bytes = mmap.len().saturating_sub(size_of::<RingHeader>());
                let available = data_bytes / size_of::<f32>();
                unsafe { std::slice::from_raw_parts(*data_ptr, samples.min(available)) }
            }
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn store_mut(&self) -> &mut [f32] {
        let samples = self.capacity_frames * self.channels;
        match &self.storage {
            RingStorage::Local { data, .. } => unsafe {
                let data: &mut Box<[f32]> = &mut *data.get();
                &mut data[..]
            },
            RingStorage::Shared { mmap, data_ptr, .. } => {
                let mmap = unsafe { &*mmap.get() };
                let data_bytes = mmap.len().saturating_sub(size_of::<RingHeader>());
                let available = data_bytes / size_of::<f32>();
                unsafe { std::slice::from_raw_parts_mut(*data_ptr, samples.min(available)) }
            }
        }
    }

    /// Realized capacity in frames (always a power of two, never 0).
    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    /// Channel count fixed at construction.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Total capacity in samples (`frames * channels`).
    pub fn capacity_samples(&self) -> usize {
        self.capacity_frames * self.channels
    }

    /// Frames ready for reading. Loads `write_cursor` with acquire semantics so
    /// the count never overstates true readiness.
    pub fn available_frames(&self) -> usize {
        let header = self.header();
        let write = header.write_cursor.load(Ordering::Acquire);
        let read = header.read_cursor.load(Ordering::Acquire);
        write.saturating_sub(read).min(self.capacity_frames as u64) as usize
    }

    /// Frames of free capacity left for writing.
    pub fn free_frames(&self) -> usize {
        self.capacity_frames - self.available_frames()
    }

    /// Set both cursors to 0 and zero the store, discarding stale data.
    ///
    /// Not safe concurrently with an in-flight `write` or `read`; the caller
    /// must quiesce the stream first. [`LoopbackStream`](crate::LoopbackStream)
    /// serializes this with its start/stop transitions.
    pub fn reset(&self) {
        let header = self.header();
        header.write_cursor.store(0, Ordering::Relaxed);
        header.read_cursor.store(0, Ordering::Relaxed);
        self.store_mut().fill(0.0);
    }

    /// Write interleaved frames, writer side only. The frame count is
    /// `data.len() / channels`; trailing samples short of a full frame are
    /// ignored. Frames beyond free capacity are silently dropped (newest data
    /// lost) and the short count is returned. A zero-frame request is a no-op
    /// returning 0.
    pub fn write(&self, data: &[f32]) -> usize {
        let frames = data.len() / self.channels;
        if frames == 0 {
            return 0;
        }

        let header = self.header();
        let capacity = self.capacity_frames as u64;
        let write = header.write_cursor.load(Ordering::Relaxed);
        let read = header.read_cursor.load(Ordering::Acquire);
        let used = write.saturating_sub(read).min(capacity);
        let to_write = frames.min((capacity - used) as usize);
        if to_write == 0 {
            return 0;
        }

        let store = self.store_mut();
        let start = (write & (capacity - 1)) as usize;
        let first_frames = (self.capacity_frames - start).min(to_write);
        let first_samples = first_frames * self.channels;
        let dest = start * self.channels;
        store[dest..dest + first_samples].copy_from_slice(&data[..first_samples]);
        if to_write > first_frames {
            let rest_samples = (to_write - first_frames) * self.channels;
            store[..rest_samples]
                .copy_from_slice(&data[first_samples..first_samples + rest_samples]);
        }

        // Publish after the sample data is in place so the reader never
        // observes the advanced cursor before the data is visible.
        header
            .write_cursor
            .store(write + to_write as u64, Ordering::Release);
        to_write
    }

    /// Read interleaved frames, reader side only. The requested frame count is
    /// `out.len() / channels`. Copies what is available, fills the remainder of
    /// the request with digital silence, and returns the frames actually read.
    /// A zero-frame request is a no-op returning 0.
    pub fn read(&self, out: &mut [f32]) -> usize {
        let requested = out.len() / self.channels;
        if requested == 0 {
            return 0;
        }

        let to_read = self.copy_out(out, requested);
        out[to_read * self.channels..].fill(0.0);

        if to_read > 0 {
            let header = self.header();
            let read = header.read_cursor.load(Ordering::Relaxed);
            header
                .read_cursor
                .store(read + to_read as u64, Ordering::Release);
        }
        to_read
    }

    /// Copy like [`read`](Self::read) but without advancing the read cursor and
    /// without silence fill; returns only what is actually available.
    pub fn peek(&self, out: &mut [f32]) -> usize {
        let requested = out.len() / self.channels;
        if requested == 0 {
            return 0;
        }
        self.copy_out(out, requested)
    }

    /// Advance the read cursor by up to `frames` without copying, returning the
    /// number of frames discarded.
    pub fn skip(&self, frames: usize) -> usize {
        if frames == 0 {
            return 0;
        }
        let header = self.header();
        let capacity = self.capacity_frames as u64;
        let write = header.write_cursor.load(Ordering::Acquire);
        let read = header.read_cursor.load(Ordering::Relaxed);
        let available = write.saturating_sub(read).min(capacity) as usize;
        let to_skip = frames.min(available);
        if to_skip > 0 {
            header
                .read_cursor
                .store(read + to_skip as u64, Ordering::Release);
        }
        to_skip
    }

    // Shared copy path for read/peek. The acquire load of `write_cursor`
    // guarantees all sample data up to the returned count is visible.
    fn copy_out(&self, out: &mut [f32], requested: usize) -> usize {
        let header = self.header();
        let capacity = self.capacity_frames as u64;
        let write = header.write_cursor.load(Ordering::Acquire);
        let read = header.read_cursor.load(Ordering::Relaxed);
        let available = write.saturating_sub(read).min(capacity) as usize;
        let to_read = requested.min(available);
        if to_read == 0 {
            return 0;
        }

        let store = self.store();
        let start = (read & (capacity - 1)) as usize;
        let first_frames = (self.capacity_frames - start).min(to_read);
        let first_samples = first_frames * self.channels;
        let src = start * self.channels;
        out[..first_samples].copy_from_slice(&store[src..src + first_samples]);
        if to_read > first_frames {
            let rest_samples = (to_read - first_frames) * self.channels;
            out[first_samples..first_samples + rest_samples]
                .copy_from_slice(&store[..rest_samples]);
        }
        to_read
    }
}
