//! cpal audio output
//!
//! The mixing thread pushes interleaved samples into a lock-free ring; the
//! device callback pops them and signals a condvar so [`AudioSink::wait_ready`]
//! wakes as soon as space frees up.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use tracing::{debug, error, trace, warn};

use retroframe_core::{AudioSink, SinkFactory};

/// ~150ms of stereo at 44.1kHz
const RING_BUFFER_SIZE: usize = 13_230;

/// Longest a single `wait_ready` call blocks before handing control back
const WAIT_LIMIT: Duration = Duration::from_millis(5);

type Signal = Arc<(Mutex<bool>, Condvar)>;

/// Default output device fed from a ring buffer.
pub struct CpalSink {
    producer: ringbuf::HeapProd<f32>,
    signal: Signal,
    /// The cpal stream (kept alive for the duration)
    _stream: cpal::Stream,
    sample_rate: u32,
    channels: usize,
    volume: f32,
    /// Device-layout samples staged for the ring
    staging: Vec<f32>,
    dropped: u64,
}

impl CpalSink {
    /// Open the default output device.
    pub fn new(volume: f32) -> Result<Self, String> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| "No audio output device available".to_string())?;

        let config = device
            .default_output_config()
            .map_err(|e| format!("Failed to get default output config: {}", e))?;

        let sample_rate = config.sample_rate().0;
        let channels = usize::from(config.channels()).max(1);

        let ring = HeapRb::<f32>::new(RING_BUFFER_SIZE.max(channels * 2048));
        let (producer, consumer) = ring.split();
        let signal: Signal = Arc::new((Mutex::new(false), Condvar::new()));

        let sample_format = config.sample_format();
        let stream_config: cpal::StreamConfig = config.into();
        let stream = match sample_format {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &stream_config, consumer, signal.clone())?
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &stream_config, consumer, signal.clone())?
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &stream_config, consumer, signal.clone())?
            }
            other => return Err(format!("Unsupported sample format: {:?}", other)),
        };

        stream
            .play()
            .map_err(|e| format!("Failed to play audio stream: {}", e))?;

        debug!(
            "Audio stream started at {}Hz, {} channel(s), {:?}",
            sample_rate, channels, sample_format
        );

        Ok(Self {
            producer,
            signal,
            _stream: stream,
            sample_rate,
            channels,
            volume: volume.clamp(0.0, 1.0),
            staging: Vec::new(),
            dropped: 0,
        })
    }
}

impl AudioSink for CpalSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn wait_ready(&mut self, frames: usize) {
        let wanted = (frames * self.channels).min(self.producer.capacity().get());
        let deadline = Instant::now() + WAIT_LIMIT;
        let (lock, cvar) = &*self.signal;
        while self.producer.vacant_len() < wanted {
            let now = Instant::now();
            if now >= deadline {
                trace!("Audio device still busy after {:?}", WAIT_LIMIT);
                return;
            }
            let guard = lock.lock().unwrap_or_else(|e| {
                warn!("Audio output condvar mutex poisoned; continuing");
                e.into_inner()
            });
            let _ = cvar
                .wait_timeout(guard, (deadline - now).min(Duration::from_millis(1)))
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    fn write(&mut self, samples: &[f32]) {
        spread_channels(samples, self.channels, self.volume, &mut self.staging);
        let pushed = self.producer.push_slice(&self.staging);
        if pushed < self.staging.len() {
            self.dropped += (self.staging.len() - pushed) as u64;
            trace!(
                "Audio ring full, dropped {} samples ({} total)",
                self.staging.len() - pushed,
                self.dropped
            );
        }
    }
}

/// Factory that opens the default device on the mixing thread.
pub fn cpal_sink_factory(volume: f32) -> SinkFactory {
    Box::new(move || {
        let sink = CpalSink::new(volume)?;
        Ok(Box::new(sink) as Box<dyn AudioSink>)
    })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: ringbuf::HeapCons<f32>,
    signal: Signal,
) -> Result<cpal::Stream, String>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    // Pre-allocated so the callback never allocates in steady state
    let mut temp_buffer: Vec<f32> = vec![0.0; 4096];
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if temp_buffer.len() < data.len() {
                    temp_buffer.resize(data.len(), 0.0);
                }
                let popped = consumer.pop_slice(&mut temp_buffer[..data.len()]);
                for (out, &sample) in data.iter_mut().zip(&temp_buffer[..popped]) {
                    *out = T::from_sample(sample);
                }
                data[popped..].fill(T::EQUILIBRIUM);

                let (_lock, cvar) = &*signal;
                cvar.notify_one();
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| format!("Failed to build audio stream: {}", e))
}

/// Convert interleaved stereo into the device channel layout with volume.
///
/// Mono devices get the average of both sides; extra channels stay silent.
fn spread_channels(stereo: &[f32], channels: usize, volume: f32, out: &mut Vec<f32>) {
    out.clear();
    out.reserve(stereo.len() / 2 * channels);
    for frame in stereo.chunks_exact(2) {
        let (left, right) = (frame[0] * volume, frame[1] * volume);
        match channels {
            1 => out.push((left + right) * 0.5),
            _ => {
                out.push(left);
                out.push(right);
                out.extend(std::iter::repeat_n(0.0, channels - 2));
            }
        }
    }
}
