use tokio::sync::mpsc;

use crate::error::Result;

/// Raw block of samples delivered by a capture device callback
#[derive(Debug, Clone)]
pub struct CapturedBlock {
    /// Normalized f32 samples, interleaved when `channels > 1`
    pub samples: Vec<f32>,
    /// Device sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
}

/// One encoded outbound frame: 16-bit little-endian mono PCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Frame number since capture started
    pub sequence: u64,
    /// Encoded PCM bytes (`2 × window_size`)
    pub pcm: Vec<u8>,
}

/// Configuration for a capture backend
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate of outbound frames
    pub target_sample_rate: u32,
    /// Samples per outbound frame
    pub window_size: usize,
    /// Device-to-pipeline queue capacity (blocks beyond this are dropped)
    pub queue_depth: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000,
            window_size: 4096,
            queue_depth: 64,
        }
    }
}

impl From<&crate::config::AudioConfig> for CaptureConfig {
    fn from(cfg: &crate::config::AudioConfig) -> Self {
        Self {
            target_sample_rate: cfg.sample_rate,
            window_size: cfg.window_size,
            queue_depth: cfg.input_queue_depth,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - `CpalMicrophone`: default input device via cpal
/// - `testing::FakeCapture`: scripted blocks for tests
#[async_trait::async_trait]
pub trait CaptureBackend: Send {
    /// Acquire the device and start sampling
    ///
    /// Returns a channel receiver that will receive raw device blocks.
    /// Fails with `ClientError::Permission` or `ClientError::Device`.
    async fn start(&mut self, config: &CaptureConfig) -> Result<mpsc::Receiver<CapturedBlock>>;

    /// Release the device. Must be safe to call when not capturing.
    async fn stop(&mut self);

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}
