use std::env;
use std::process;
use std::sync::Arc;

use frame_ring::control::demo::LoopbackDemo;
use frame_ring::{LoopbackStream, StreamConfig, init_tracing, probe};

fn run_selftest() -> bool {
    let config = StreamConfig::default();
    let stream = match LoopbackStream::new(config) {
        Ok(stream) => stream,
        Err(err) => {
            eprintln!("ringctl: {err}");
            return false;
        }
    };
    stream.start_io();

    let cycle_samples = config.frames_per_cycle * config.channels;
    let total_cycles = config.sample_rate as usize / config.frames_per_cycle; // ~1 second
    let mut probe_source = probe::SineProbe::new(config.sample_rate, 440.0, config.channels);
    let mut block = vec![0.0f32; cycle_samples];
    let mut reference = Vec::with_capacity(total_cycles * cycle_samples);
    let mut recorded = Vec::with_capacity(total_cycles * cycle_samples);

    for _ in 0..total_cycles {
        probe_source.fill(&mut block);
        reference.extend_from_slice(&block);
        stream.write_cycle(&block);
        stream.read_cycle(&mut block);
        recorded.extend_from_slice(&block);
    }
    stream.stop_io();

    let report = probe::compare(&reference, &recorded);
    println!("Reference RMS : {:.4}", report.reference_rms);
    println!("Recorded RMS  : {:.4}", report.recorded_rms);
    println!("Correlation   : {:.4}", report.correlation);
    let status = stream.status();
    println!(
        "Frames        : {} written, {} read, {} overrun, {} underrun",
        status.frames_written, status.frames_read, status.overrun_frames, status.underrun_frames
    );
    if report.is_clean() {
        println!("Self-test PASSED");
        true
    } else {
        println!("Self-test FAILED");
        false
    }
}

fn run_console() -> i32 {
    let demo = match LoopbackDemo::start(StreamConfig::default(), 440.0) {
        Ok(demo) => Arc::new(demo),
        Err(err) => {
            eprintln!("ringctl: {err}");
            return 1;
        }
    };
    if let Err(err) = frame_ring::control::ui::run(demo) {
        eprintln!("ringctl: {err}");
        return 1;
    }
    0
}

fn main() {
    init_tracing();

    let mut args = env::args().skip(1);
    if let Some(arg) = args.next() {
        match arg.as_str() {
            "--selftest" | "-t" => {
                process::exit(if run_selftest() { 0 } else { 1 });
            }
            "--help" | "-h" => {
                println!(
                    "Usage: ringctl [--selftest]\n\nWithout arguments the interactive console launches."
                );
                return;
            }
            other => {
                eprintln!("ringctl: unknown argument '{other}'");
                process::exit(1);
            }
        }
    }

    process::exit(run_console());
}
