use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use std::io::Cursor;
use tracing::debug;

use crate::error::{ClientError, Result};

/// One inbound unit of compressed audio, in arrival order
#[derive(Debug, Clone)]
pub struct CompressedChunk {
    /// Arrival number, assigned by the scheduler
    pub sequence: u64,
    pub bytes: Vec<u8>,
}

/// Decoded PCM with its intrinsic duration
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved f32 samples
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Compressed-audio decoding capability
#[async_trait::async_trait]
pub trait ChunkDecoder: Send + Sync {
    async fn decode(&self, chunk: &CompressedChunk) -> Result<DecodedAudio>;
}

/// Decoder backed by symphonia's format probe and codec registry.
///
/// Decoding runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct SymphoniaDecoder {
    /// File extension hint for the probe (server sends MP3)
    extension: String,
}

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self::with_extension("mp3")
    }

    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }
}

impl Default for SymphoniaDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ChunkDecoder for SymphoniaDecoder {
    async fn decode(&self, chunk: &CompressedChunk) -> Result<DecodedAudio> {
        let bytes = chunk.bytes.clone();
        let extension = self.extension.clone();
        tokio::task::spawn_blocking(move || decode_bytes(bytes, &extension))
            .await
            .map_err(|e| ClientError::Decode(format!("decode task failed: {}", e)))?
    }
}

fn decode_bytes(bytes: Vec<u8>, extension: &str) -> Result<DecodedAudio> {
    if bytes.is_empty() {
        return Err(ClientError::Decode("empty chunk".to_string()));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    hint.with_extension(extension);

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ClientError::Decode(format!("unrecognized audio format: {}", e)))?;
    let mut format = probed.format;

    let (track_id, codec_params) = {
        let track = format
            .default_track()
            .ok_or_else(|| ClientError::Decode("no audio track".to_string()))?;
        (track.id, track.codec_params.clone())
    };

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| ClientError::Decode(format!("unsupported codec: {}", e)))?;

    let mut samples = Vec::new();
    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut channels = codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(1);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(ClientError::Decode(format!("failed to read packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping corrupt packet: {}", e);
            }
            Err(e) => return Err(ClientError::Decode(format!("codec failure: {}", e))),
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(ClientError::Decode("chunk contained no audio".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_from_frames() {
        let audio = DecodedAudio {
            samples: vec![0.0; 48000],
            sample_rate: 24000,
            channels: 2,
        };
        assert_eq!(audio.frames(), 24000);
        assert!((audio.duration() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_garbage_bytes_fail_to_decode() {
        let decoder = SymphoniaDecoder::new();
        let chunk = CompressedChunk {
            sequence: 0,
            bytes: b"definitely not audio".to_vec(),
        };
        assert!(matches!(
            decoder.decode(&chunk).await,
            Err(ClientError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_chunk_fails_to_decode() {
        let decoder = SymphoniaDecoder::new();
        let chunk = CompressedChunk {
            sequence: 0,
            bytes: Vec::new(),
        };
        assert!(decoder.decode(&chunk).await.is_err());
    }
}
