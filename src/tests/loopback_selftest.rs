use crate::probe::{SineProbe, compare};
use crate::{LoopbackStream, StreamConfig};

#[test]
fn loopback_selftest_sine_through_stream() {
    let config = StreamConfig {
        sample_rate: 48_000,
        channels: 2,
        frames_per_cycle: 256,
        ring_frames: 4_096,
    };
    let stream = LoopbackStream::new(config).expect("stream allocation");
    stream.start_io();

    let cycle_samples = config.frames_per_cycle * config.channels;
    let total_cycles = 20; // ~100ms
    let mut probe = SineProbe::new(config.sample_rate, 1_000.0, config.channels);
    let mut block = vec![0.0f32; cycle_samples];
    let mut reference = Vec::with_capacity(total_cycles * cycle_samples);
    let mut recorded = Vec::with_capacity(total_cycles * cycle_samples);

    for _ in 0..total_cycles {
        probe.fill(&mut block);
        reference.extend_from_slice(&block);
        let written = stream.write_cycle(&block);
        assert_eq!(written, config.frames_per_cycle);
        let read = stream.read_cycle(&mut block);
        assert_eq!(read, config.frames_per_cycle);
        recorded.extend_from_slice(&block);
    }
    stream.stop_io();

    assert_eq!(recorded.len(), reference.len());

    let report = compare(&reference, &recorded);
    assert!(
        report.is_clean(),
        "round trip degraded: rms {} vs {}, correlation {}",
        report.reference_rms,
        report.recorded_rms,
        report.correlation
    );

    let status = stream.status();
    assert_eq!(status.overrun_frames, 0);
    assert_eq!(status.underrun_frames, 0);
}
