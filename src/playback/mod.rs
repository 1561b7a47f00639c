//! Inbound audio: decode compressed chunks and schedule them back-to-back on
//! the output clock.

mod cursor;
mod decoder;
mod output;
mod scheduler;

pub use cursor::PlaybackCursor;
pub use decoder::{ChunkDecoder, CompressedChunk, DecodedAudio, SymphoniaDecoder};
pub use output::{CpalOutput, NullOutput, PlaybackOutput, Timeline};
pub use scheduler::{PlaybackScheduler, PlaybackStats};
