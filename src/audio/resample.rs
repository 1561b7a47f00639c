// Channel down-mixing and sample-rate conversion for f32 audio.
//
// Used on both sides: capture blocks arrive at the device rate and must reach
// 16 kHz mono, decoded playback chunks must reach the output device rate.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{debug, error};

use crate::error::{ClientError, Result};

/// Rubato block length used for one-shot conversion of decoded chunks
const CHUNK_FRAMES: usize = 1024;

/// Average interleaved channels into a mono signal.
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

fn fixed_in(from_rate: u32, to_rate: u32, chunk_size: usize) -> Result<FastFixedIn<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(ClientError::Device(format!(
            "invalid sample rates {}Hz -> {}Hz",
            from_rate, to_rate
        )));
    }
    FastFixedIn::<f32>::new(
        to_rate as f64 / from_rate as f64,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )
    .map_err(|e| ClientError::Device(format!("resampler init: {}", e)))
}

/// Convert a complete mono buffer to another rate.
///
/// Output length is `round(len * to_rate / from_rate)`; the resampler's
/// startup delay is trimmed so the first output sample lines up with the first input.
pub fn resample_buffer(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = fixed_in(from_rate, to_rate, CHUNK_FRAMES)?;
    let delay = resampler.output_delay();
    let expected = (samples.len() as f64 * to_rate as f64 / from_rate as f64).round() as usize;

    let mut out = Vec::with_capacity(expected + delay + resampler.output_frames_max());
    let mut output_buf = vec![vec![0f32; resampler.output_frames_max()]; 1];
    let mut block = vec![0f32; CHUNK_FRAMES];
    let mut offset = 0;

    // Trailing blocks are zero padding that flushes the delay line.
    while out.len() < expected + delay {
        block.fill(0.0);
        if offset < samples.len() {
            let n = (samples.len() - offset).min(CHUNK_FRAMES);
            block[..n].copy_from_slice(&samples[offset..offset + n]);
        }
        offset += CHUNK_FRAMES;

        let (_consumed, produced) = resampler
            .process_into_buffer(&[&block[..]], &mut output_buf, None)
            .map_err(|e| ClientError::Device(format!("resampler process: {}", e)))?;
        if produced == 0 {
            break;
        }
        out.extend_from_slice(&output_buf[0][..produced]);
    }

    out.drain(..delay.min(out.len()));
    out.truncate(expected);
    Ok(out)
}

/// Streaming converter for capture blocks.
///
/// Input is accumulated until a full rubato chunk is available; the remainder
/// waits for the next call. Equal rates pass through untouched.
pub struct RateConverter {
    from_rate: u32,
    resampler: Option<FastFixedIn<f32>>,
    input_buf: Vec<f32>,
    chunk_size: usize,
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// `chunk_size` is 20 ms of input at `from_rate`.
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        let chunk_size = (from_rate as usize / 50).max(1);
        if from_rate == to_rate {
            return Ok(Self {
                from_rate,
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let resampler = fixed_in(from_rate, to_rate, chunk_size)?;
        let output_buf = vec![vec![0f32; resampler.output_frames_max()]; 1];
        debug!(
            "Capture resampling {}Hz -> {}Hz in chunks of {}",
            from_rate, to_rate, chunk_size
        );

        Ok(Self {
            from_rate,
            resampler: Some(resampler),
            input_buf: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            output_buf,
        })
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    /// Process one block; output may be empty while input accumulates
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);

        let mut result = Vec::new();
        while self.input_buf.len() >= self.chunk_size {
            let input = &self.input_buf[..self.chunk_size];
            match resampler.process_into_buffer(&[input], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => error!("Capture resampler failed: {}", e),
            }
            self.input_buf.drain(..self.chunk_size);
        }
        result
    }
}

impl std::fmt::Debug for RateConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateConverter")
            .field("from_rate", &self.from_rate)
            .field("passthrough", &self.is_passthrough())
            .field("buffered", &self.input_buf.len())
            .finish()
    }
}
