//! Speaker output with a sample-accurate playback clock.
//!
//! The output device pulls from a `Timeline` of buffers placed at absolute
//! frame positions. The number of frames rendered so far is the monotonic
//! clock that the scheduler reads.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::decoder::DecodedAudio;
use crate::audio::resample::{downmix_to_mono, resample_buffer};
use crate::error::{ClientError, Result};

/// Playback clock plus the ability to place audio on it
pub trait PlaybackOutput: Send + Sync {
    /// Current position of the output clock in seconds
    fn now(&self) -> f64;

    /// Play `audio` starting at `start_at` seconds on the output clock
    fn schedule(&self, audio: DecodedAudio, start_at: f64) -> Result<()>;
}

#[derive(Debug)]
struct Placed {
    start_frame: u64,
    samples: Vec<f32>,
}

impl Placed {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Mono sample timeline rendered by the output callback
#[derive(Debug, Default)]
pub struct Timeline {
    rendered: u64,
    queue: VecDeque<Placed>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames rendered so far
    pub fn rendered(&self) -> u64 {
        self.rendered
    }

    /// Buffers still waiting to be (fully) rendered
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn place(&mut self, start_frame: u64, samples: Vec<f32>) {
        if start_frame < self.rendered {
            warn!(
                "Chunk placed {} frames in the past, its head will be cut",
                self.rendered - start_frame
            );
        }
        self.queue.push_back(Placed {
            start_frame,
            samples,
        });
    }

    /// Fill `out` with the next `out.len()` mono frames and advance the clock
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let first = self.rendered;
        let last = first + out.len() as u64;

        for placed in &self.queue {
            if placed.start_frame >= last || placed.end_frame() <= first {
                continue;
            }
            let from = placed.start_frame.max(first);
            let to = placed.end_frame().min(last);
            for frame in from..to {
                out[(frame - first) as usize] += placed.samples[(frame - placed.start_frame) as usize];
            }
        }

        self.rendered = last;
        self.queue.retain(|p| p.end_frame() > last);
    }
}

/// Default output device via cpal, driven from a dedicated device thread
pub struct CpalOutput {
    timeline: Arc<Mutex<Timeline>>,
    sample_rate: u32,
    stop_tx: Option<std_mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CpalOutput {
    /// Open the default output device and start rendering silence
    pub fn open() -> Result<Self> {
        let timeline = Arc::new(Mutex::new(Timeline::new()));
        let (open_tx, open_rx) = std_mpsc::channel::<Result<u32>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread_timeline = Arc::clone(&timeline);
        let handle = std::thread::Builder::new()
            .name("speaker-output".to_string())
            .spawn(move || {
                let (stream, rate) = match open_output_stream(thread_timeline) {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };
                let _ = open_tx.send(Ok(rate));
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Output stream released");
            })
            .map_err(|e| ClientError::Device(format!("failed to spawn output thread: {}", e)))?;

        let sample_rate = match open_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(ClientError::Device(
                    "output thread exited before opening the device".to_string(),
                ));
            }
        };

        info!("Speaker output ready at {}Hz", sample_rate);

        Ok(Self {
            timeline,
            sample_rate,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl PlaybackOutput for CpalOutput {
    fn now(&self) -> f64 {
        self.timeline.lock().rendered() as f64 / self.sample_rate as f64
    }

    fn schedule(&self, audio: DecodedAudio, start_at: f64) -> Result<()> {
        let mono = downmix_to_mono(&audio.samples, audio.channels);
        let samples = resample_buffer(&mono, audio.sample_rate, self.sample_rate)?;
        let start_frame = (start_at * self.sample_rate as f64).round().max(0.0) as u64;
        self.timeline.lock().place(start_frame, samples);
        Ok(())
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Output thread panicked during shutdown");
            }
        }
    }
}

fn open_output_stream(timeline: Arc<Mutex<Timeline>>) -> Result<(Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| ClientError::Device("no output device available".to_string()))?;

    info!(
        "Using output device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let supported = device
        .default_output_config()
        .map_err(|e| ClientError::Device(format!("failed to get output config: {}", e)))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let rate = config.sample_rate.0;

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, timeline),
        SampleFormat::I16 => build_stream::<i16>(&device, &config, timeline),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, timeline),
        other => {
            return Err(ClientError::Device(format!(
                "unsupported output sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| ClientError::Device(format!("failed to build output stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| ClientError::Device(format!("failed to start output stream: {}", e)))?;

    Ok((stream, rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    timeline: Arc<Mutex<Timeline>>,
) -> std::result::Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let mut mono: Vec<f32> = Vec::new();

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            mono.resize(frames, 0.0);
            timeline.lock().render(&mut mono);
            for (frame, value) in data.chunks_mut(channels).zip(mono.iter()) {
                let sample = T::from_sample(value.clamp(-1.0, 1.0));
                frame.fill(sample);
            }
        },
        |err| error!("Audio output stream error: {}", err),
        None,
    )
}

/// Output that discards audio but keeps a wall-clock timeline.
///
/// Used when no speaker is available so the rest of the client keeps working.
#[derive(Debug)]
pub struct NullOutput {
    origin: Instant,
}

impl NullOutput {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for NullOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackOutput for NullOutput {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn schedule(&self, audio: DecodedAudio, start_at: f64) -> Result<()> {
        debug!(
            "Discarding {:.3}s of audio scheduled at {:.3}s (no output device)",
            audio.duration(),
            start_at
        );
        Ok(())
    }
}
