use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backend::{AudioFrame, CaptureBackend, CaptureConfig, CapturedBlock};
use super::pcm::encode_pcm16;
use super::resample::{downmix_to_mono, RateConverter};
use crate::error::Result;

/// Callback receiving each encoded frame as soon as its window fills
pub type FrameSink = Box<dyn Fn(AudioFrame) + Send + Sync>;

/// Called once if the device stops delivering blocks on its own (unplugged,
/// stream error). Not called after `stop`.
pub type EndSink = Box<dyn FnOnce() + Send>;

/// Turns raw device blocks into fixed-size, 16 kHz mono PCM frames
#[derive(Debug)]
pub struct FrameAssembler {
    target_rate: u32,
    window_size: usize,
    resampler: Option<RateConverter>,
    pending: Vec<f32>,
    sequence: u64,
}

impl FrameAssembler {
    pub fn new(target_rate: u32, window_size: usize) -> Self {
        Self {
            target_rate,
            window_size: window_size.max(1),
            resampler: None,
            pending: Vec::with_capacity(window_size * 2),
            sequence: 0,
        }
    }

    /// Feed one device block; returns every frame completed by it
    pub fn push(&mut self, block: &CapturedBlock) -> Result<Vec<AudioFrame>> {
        let mono = downmix_to_mono(&block.samples, block.channels);

        let stale = self
            .resampler
            .as_ref()
            .map_or(true, |rc| rc.from_rate() != block.sample_rate);
        if stale {
            if self.resampler.is_some() {
                warn!(
                    "Capture device rate changed to {}Hz, resetting resampler",
                    block.sample_rate
                );
            }
            self.resampler = Some(RateConverter::new(block.sample_rate, self.target_rate)?);
        }

        match self.resampler.as_mut() {
            Some(rc) => self.pending.extend(rc.process(&mono)),
            None => self.pending.extend(mono),
        }

        let mut frames = Vec::new();
        while self.pending.len() >= self.window_size {
            let window: Vec<f32> = self.pending.drain(..self.window_size).collect();
            frames.push(AudioFrame {
                sequence: self.sequence,
                pcm: encode_pcm16(&window),
            });
            self.sequence += 1;
        }
        Ok(frames)
    }

    /// Samples waiting for the next window
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Microphone → PCM frame pipeline
///
/// Owns exactly one capture backend. Frames are handed to the sink that was
/// supplied at start; whether they reach the transport is the sink's decision.
pub struct CapturePipeline {
    backend: Box<dyn CaptureBackend>,
    config: CaptureConfig,
    task: Option<JoinHandle<()>>,
}

impl CapturePipeline {
    pub fn new(backend: Box<dyn CaptureBackend>, config: CaptureConfig) -> Self {
        Self {
            backend,
            config,
            task: None,
        }
    }

    /// Acquire the device and begin windowing. A running pipeline is stopped first.
    pub async fn start(&mut self, sink: FrameSink, on_end: EndSink) -> Result<()> {
        if self.is_running() {
            warn!("Capture pipeline already running, restarting");
            self.stop().await;
        }

        info!("Starting capture on {}", self.backend.name());

        let mut blocks = self.backend.start(&self.config).await?;
        let mut assembler = FrameAssembler::new(self.config.target_sample_rate, self.config.window_size);

        let task = tokio::spawn(async move {
            let mut sent = 0u64;
            while let Some(block) = blocks.recv().await {
                let frames = match assembler.push(&block) {
                    Ok(frames) => frames,
                    Err(e) => {
                        error!("Capture block rejected: {}", e);
                        break;
                    }
                };
                for frame in frames {
                    sink(frame);
                    sent += 1;
                }
            }
            debug!(
                "Capture block stream ended after {} frames ({} samples discarded)",
                sent,
                assembler.pending_len()
            );
            on_end();
        });

        self.task = Some(task);
        Ok(())
    }

    /// Release the device and stop windowing. No-op when not running.
    pub async fn stop(&mut self) {
        if !self.needs_stop() {
            return;
        }

        self.backend.stop().await;

        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }

        info!("Capture pipeline stopped");
    }

    /// False once stopped or once the device stream has ended by itself
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Whether device resources may still be held and need `stop`
    pub fn needs_stop(&self) -> bool {
        self.task.is_some() || self.backend.is_capturing()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::decode_pcm16;

    fn block(samples: Vec<f32>, sample_rate: u32, channels: u16) -> CapturedBlock {
        CapturedBlock {
            samples,
            sample_rate,
            channels,
        }
    }

    #[test]
    fn test_assembler_emits_fixed_windows() {
        let mut asm = FrameAssembler::new(16000, 4);
        let frames = asm.push(&block(vec![0.1; 10], 16000, 1)).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].pcm.len(), 8);
        assert_eq!(frames[0].sequence, 0);
        assert_eq!(frames[1].sequence, 1);
        assert_eq!(asm.pending_len(), 2);

        let frames = asm.push(&block(vec![0.1; 2], 16000, 1)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].sequence, 2);
        assert_eq!(asm.pending_len(), 0);
    }

    #[test]
    fn test_assembler_downmixes_and_resamples() {
        let mut asm = FrameAssembler::new(16000, 1600);
        // 200ms of 48kHz stereo: L=0.5, R=-0.5 -> mono 0.0
        let mut samples = Vec::new();
        for _ in 0..9600 {
            samples.push(0.5);
            samples.push(-0.5);
        }
        let frames = asm.push(&block(samples, 48000, 2)).unwrap();
        assert!(!frames.is_empty());
        for frame in &frames {
            assert!(decode_pcm16(&frame.pcm).iter().all(|s| s.abs() < 1e-4));
        }
    }

    #[test]
    fn test_assembler_rejects_zero_rate_block() {
        let mut asm = FrameAssembler::new(16000, 160);
        assert!(asm.push(&block(vec![0.1; 10], 0, 1)).is_err());
    }

    #[tokio::test]
    async fn test_device_loss_ends_pipeline_and_reports_once() {
        use crate::testing::FakeCapture;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let (backend, probe) = FakeCapture::new();
        let mut pipeline = CapturePipeline::new(Box::new(backend), CaptureConfig::default());
        let ended = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ended);

        pipeline
            .start(
                Box::new(|_| {}),
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap();
        assert!(pipeline.is_running());

        probe.disconnect();
        for _ in 0..100 {
            if !pipeline.is_running() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        assert!(!pipeline.is_running());
        assert!(pipeline.needs_stop());
        assert_eq!(ended.load(Ordering::SeqCst), 1);

        pipeline.stop().await;
        assert_eq!(probe.live(), 0);
        assert!(!pipeline.needs_stop());
    }
}
