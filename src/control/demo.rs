//! Self-contained loopback demo: a sine producer thread and a consumer thread
//! driving one [`LoopbackStream`] at its configured cycle rate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::probe::SineProbe;
use crate::ring::RingError;
use crate::{LoopbackStream, StreamConfig, StreamStatus};

/// Running demo owning the stream and both cycle threads.
///
/// The producer and consumer can be paused independently to provoke visible
/// overruns and underruns from the console. Dropping the demo stops both
/// threads and the stream.
pub struct LoopbackDemo {
    stream: Arc<LoopbackStream>,
    stop: Arc<AtomicBool>,
    producer_paused: Arc<AtomicBool>,
    consumer_paused: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
    consumer: Option<JoinHandle<()>>,
}

impl LoopbackDemo {
    /// Start the demo: create the stream, start I/O, and launch both threads.
    pub fn start(config: StreamConfig, frequency_hz: f64) -> Result<Self, RingError> {
        let stream = Arc::new(LoopbackStream::new(config)?);
        stream.start_io();

        let stop = Arc::new(AtomicBool::new(false));
        let producer_paused = Arc::new(AtomicBool::new(false));
        let consumer_paused = Arc::new(AtomicBool::new(false));

        let cycle_samples = config.frames_per_cycle * config.channels;
        let cycle_period = Duration::from_nanos(
            config.frames_per_cycle as u64 * 1_000_000_000 / config.sample_rate.max(1) as u64,
        );

        let producer = {
            let stream = stream.clone();
            let stop = stop.clone();
            let paused = producer_paused.clone();
            let mut probe = SineProbe::new(config.sample_rate, frequency_hz, config.channels);
            let mut block = vec![0.0f32; cycle_samples];
            thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    if !paused.load(Ordering::Acquire) {
                        probe.fill(&mut block);
                        stream.write_cycle(&block);
                    }
                    thread::sleep(cycle_period);
                }
            })
        };

        let consumer = {
            let stream = stream.clone();
            let stop = stop.clone();
            let paused = consumer_paused.clone();
            let mut block = vec![0.0f32; cycle_samples];
            thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    if !paused.load(Ordering::Acquire) {
                        stream.read_cycle(&mut block);
                    }
                    thread::sleep(cycle_period);
                }
            })
        };

        Ok(Self {
            stream,
            stop,
            producer_paused,
            consumer_paused,
            producer: Some(producer),
            consumer: Some(consumer),
        })
    }

    /// Latest stream status snapshot.
    pub fn status(&self) -> StreamStatus {
        self.stream.status()
    }

    /// Pause or resume the producer thread. Returns the new paused state.
    pub fn toggle_producer(&self) -> bool {
        !self.producer_paused.fetch_xor(true, Ordering::AcqRel)
    }

    /// Pause or resume the consumer thread. Returns the new paused state.
    pub fn toggle_consumer(&self) -> bool {
        !self.consumer_paused.fetch_xor(true, Ordering::AcqRel)
    }

    /// Whether the producer is currently paused.
    pub fn producer_paused(&self) -> bool {
        self.producer_paused.load(Ordering::Acquire)
    }

    /// Whether the consumer is currently paused.
    pub fn consumer_paused(&self) -> bool {
        self.consumer_paused.load(Ordering::Acquire)
    }
}

impl Drop for LoopbackDemo {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.producer.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.consumer.take() {
            let _ = handle.join();
        }
        self.stream.stop_io();
    }
}
