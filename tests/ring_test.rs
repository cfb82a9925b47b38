use frame_ring::ring::{FrameRing, RingError, RingHeader};

/// Frame i carries `[i, -i, 2i, ...]` across channels so positions are
/// recognizable after any amount of wraparound.
fn frame_pattern(frame: usize, channels: usize) -> Vec<f32> {
    (0..channels)
        .map(|ch| match ch {
            0 => frame as f32,
            1 => -(frame as f32),
            _ => (frame * ch) as f32,
        })
        .collect()
}

fn write_frames(ring: &FrameRing, start: usize, count: usize) -> usize {
    let channels = ring.channels();
    let mut data = Vec::with_capacity(count * channels);
    for i in start..start + count {
        data.extend(frame_pattern(i, channels));
    }
    ring.write(&data)
}

fn assert_frames_eq(out: &[f32], start: usize, count: usize, channels: usize) {
    for i in 0..count {
        let expected = frame_pattern(start + i, channels);
        let actual = &out[i * channels..(i + 1) * channels];
        assert_eq!(actual, &expected[..], "frame {} mismatch", start + i);
    }
}

#[test]
fn capacity_rounds_up_to_next_power_of_two() {
    for (requested, realized) in [(0, 1), (1, 1), (2, 2), (3, 4), (100, 128), (128, 128), (129, 256)]
    {
        let ring = FrameRing::new(requested, 2).unwrap();
        assert_eq!(
            ring.capacity_frames(),
            realized,
            "request {requested} frames"
        );
        assert!(ring.capacity_frames().is_power_of_two());
    }
}

#[test]
fn round_trip_preserves_samples_for_any_channel_count() {
    for channels in 1..=6 {
        let ring = FrameRing::new(64, channels).unwrap();
        assert_eq!(write_frames(&ring, 0, 48), 48);

        let mut out = vec![1.0f32; 48 * channels];
        assert_eq!(ring.read(&mut out), 48);
        assert_frames_eq(&out, 0, 48, channels);
    }
}

#[test]
fn overrun_returns_short_count_and_drops_cleanly() {
    let ring = FrameRing::new(8, 2).unwrap();
    assert_eq!(write_frames(&ring, 0, 8), 8);

    // Ring is full: the tail of this write must be dropped, newest data lost.
    assert_eq!(write_frames(&ring, 100, 4), 0);
    assert_eq!(ring.free_frames(), 0);

    let mut out = vec![0.0f32; 8 * 2];
    assert_eq!(ring.read(&mut out), 8);
    assert_frames_eq(&out, 0, 8, 2);

    // No garbage from the dropped frames appears in later traffic.
    assert_eq!(write_frames(&ring, 200, 4), 4);
    let mut out = vec![0.0f32; 4 * 2];
    assert_eq!(ring.read(&mut out), 4);
    assert_frames_eq(&out, 200, 4, 2);
}

#[test]
fn underrun_fills_tail_with_silence() {
    let ring = FrameRing::new(16, 3).unwrap();
    assert_eq!(write_frames(&ring, 0, 5), 5);

    let mut out = vec![7.0f32; 12 * 3];
    assert_eq!(ring.read(&mut out), 5);
    assert_frames_eq(&out, 0, 5, 3);
    assert!(
        out[5 * 3..].iter().all(|&s| s == 0.0),
        "underrun tail must be digital silence"
    );
}

#[test]
fn wraparound_preserves_recent_frames() {
    let ring = FrameRing::new(8, 2).unwrap();
    let mut next = 0usize;
    let mut expected = 0usize;

    // Push cumulative traffic well past capacity in uneven chunks.
    for chunk in [5, 7, 3, 8, 6, 5, 4, 7, 2, 8] {
        let written = write_frames(&ring, next, chunk);
        next += written;

        let mut out = vec![0.0f32; written * 2];
        assert_eq!(ring.read(&mut out), written);
        assert_frames_eq(&out, expected, written, 2);
        expected += written;
    }
    assert!(next > 8 * 4, "test must exceed capacity several times over");
}

#[test]
fn reset_discards_content_and_rewinds_cursors() {
    let ring = FrameRing::new(32, 2).unwrap();
    assert_eq!(write_frames(&ring, 0, 20), 20);
    assert_eq!(ring.available_frames(), 20);

    ring.reset();
    assert_eq!(ring.available_frames(), 0);
    assert_eq!(ring.free_frames(), 32);

    let mut out = vec![3.0f32; 8 * 2];
    assert_eq!(ring.read(&mut out), 0);
    assert!(out.iter().all(|&s| s == 0.0));
}

#[test]
fn peek_copies_without_advancing() {
    let ring = FrameRing::new(16, 2).unwrap();
    assert_eq!(write_frames(&ring, 0, 6), 6);

    let mut peeked = vec![9.0f32; 10 * 2];
    assert_eq!(ring.peek(&mut peeked), 6);
    assert_frames_eq(&peeked, 0, 6, 2);
    // No silence fill on peek: the tail keeps its previous contents.
    assert!(peeked[6 * 2..].iter().all(|&s| s == 9.0));
    assert_eq!(ring.available_frames(), 6);

    let mut out = vec![0.0f32; 6 * 2];
    assert_eq!(ring.read(&mut out), 6);
    assert_frames_eq(&out, 0, 6, 2);
}

#[test]
fn skip_advances_without_copying() {
    let ring = FrameRing::new(16, 2).unwrap();
    assert_eq!(write_frames(&ring, 0, 10), 10);

    assert_eq!(ring.skip(4), 4);
    assert_eq!(ring.available_frames(), 6);

    let mut out = vec![0.0f32; 6 * 2];
    assert_eq!(ring.read(&mut out), 6);
    assert_frames_eq(&out, 4, 6, 2);

    // Skipping past availability clamps.
    assert_eq!(write_frames(&ring, 100, 3), 3);
    assert_eq!(ring.skip(50), 3);
    assert_eq!(ring.available_frames(), 0);
}

#[test]
fn zero_frame_requests_are_noops() {
    let ring = FrameRing::new(8, 2).unwrap();
    assert_eq!(ring.write(&[]), 0);
    assert_eq!(ring.read(&mut []), 0);
    assert_eq!(ring.peek(&mut []), 0);
    assert_eq!(ring.skip(0), 0);
    // A single sample is short of a whole stereo frame.
    assert_eq!(ring.write(&[1.0]), 0);
    assert_eq!(ring.available_frames(), 0);
}

#[test]
fn spec_scenario_capacity_100_stereo() {
    let ring = FrameRing::new(100, 2).unwrap();
    assert_eq!(ring.capacity_frames(), 128);

    assert_eq!(write_frames(&ring, 0, 128), 128);

    let mut out = vec![0.0f32; 64 * 2];
    assert_eq!(ring.read(&mut out), 64);
    assert_frames_eq(&out, 0, 64, 2);
    assert_eq!(ring.available_frames(), 64);
    assert_eq!(ring.free_frames(), 64);

    // Only 64 of these 80 frames fit; the remaining 16 are discarded.
    assert_eq!(write_frames(&ring, 128, 80), 64);
    assert_eq!(ring.available_frames(), 128);

    // 64 frames survived the first write and 64 more were just accepted, so a
    // 100-frame read is fully satisfied with frames 64..163 and no silent tail.
    let mut out = vec![5.0f32; 100 * 2];
    assert_eq!(ring.read(&mut out), 100);
    assert_frames_eq(&out, 64, 100, 2);
    assert_eq!(ring.available_frames(), 28);
}

#[test]
fn shared_memory_ring_round_trips() {
    let ring = FrameRing::new_shared(100, 2).unwrap();
    assert_eq!(ring.capacity_frames(), 128);
    assert_eq!(ring.channels(), 2);
    assert_eq!(ring.capacity_samples(), 256);

    assert_eq!(write_frames(&ring, 0, 32), 32);
    let mut out = vec![0.0f32; 32 * 2];
    assert_eq!(ring.read(&mut out), 32);
    assert_frames_eq(&out, 0, 32, 2);

    ring.reset();
    assert_eq!(ring.available_frames(), 0);
}

// Writes the leading capacity/channels words of a `RingHeader` (`#[repr(C)]`,
// two `u32`s) into a freshly mapped region; cursors stay at the zero fill.
fn format_region(bytes: usize, capacity_frames: u32, channels: u32) -> memmap2::MmapMut {
    let mut mmap = memmap2::MmapOptions::new().len(bytes).map_anon().unwrap();
    unsafe {
        let words = mmap.as_mut_ptr() as *mut u32;
        words.write(capacity_frames);
        words.add(1).write(channels);
    }
    mmap
}

#[test]
fn from_mmap_refuses_a_mapping_shorter_than_its_header_claims() {
    use std::mem::size_of;

    // Header claims 64x2 frames but the region holds only 16 data bytes.
    let short = format_region(size_of::<RingHeader>() + 16, 64, 2);
    let err = FrameRing::from_mmap(short)
        .err()
        .expect("short mapping must be refused");
    assert!(matches!(
        err,
        RingError::Attach {
            frames: 64,
            channels: 2,
            ..
        }
    ));

    // A region that cannot even hold the header is refused as well.
    let tiny = memmap2::MmapOptions::new().len(8).map_anon().unwrap();
    assert!(FrameRing::from_mmap(tiny).is_err());
}

#[test]
fn from_mmap_attaches_and_round_trips() {
    use std::mem::size_of;

    let bytes = size_of::<RingHeader>() + 64 * 2 * size_of::<f32>();
    let region = format_region(bytes, 64, 2);
    let ring = FrameRing::from_mmap(region).unwrap();
    assert_eq!(ring.capacity_frames(), 64);
    assert_eq!(ring.channels(), 2);
    assert_eq!(ring.available_frames(), 0);

    assert_eq!(write_frames(&ring, 0, 48), 48);
    let mut out = vec![0.0f32; 48 * 2];
    assert_eq!(ring.read(&mut out), 48);
    assert_frames_eq(&out, 0, 48, 2);
}

#[test]
fn spsc_threads_preserve_sequence_integrity() {
    use std::sync::Arc;
    use std::thread;

    const TOTAL: usize = 200_000;
    const CHUNK: usize = 64;

    let ring = Arc::new(FrameRing::new(1_024, 1).unwrap());

    let producer = {
        let ring = ring.clone();
        thread::spawn(move || {
            let mut next = 0usize;
            let mut chunk = vec![0.0f32; CHUNK];
            while next < TOTAL {
                let count = CHUNK.min(TOTAL - next);
                for (i, slot) in chunk[..count].iter_mut().enumerate() {
                    *slot = (next + i) as f32;
                }
                let mut offset = 0;
                while offset < count {
                    let written = ring.write(&chunk[offset..count]);
                    offset += written;
                    if written == 0 {
                        thread::yield_now();
                    }
                }
                next += count;
            }
        })
    };

    let consumer = {
        let ring = ring.clone();
        thread::spawn(move || {
            let mut expected = 0usize;
            let mut out = vec![0.0f32; CHUNK];
            while expected < TOTAL {
                let read = ring.read(&mut out);
                if read == 0 {
                    thread::yield_now();
                    continue;
                }
                for &sample in &out[..read] {
                    assert_eq!(sample, expected as f32, "sequence broke at {expected}");
                    expected += 1;
                }
            }
        })
    };

    producer.join().expect("producer thread");
    consumer.join().expect("consumer thread");
    assert_eq!(ring.available_frames(), 0);
}
