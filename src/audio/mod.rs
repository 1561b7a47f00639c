pub mod backend;
pub mod capture;
pub mod microphone;
pub mod pcm;
pub mod resample;

pub use backend::{AudioFrame, CaptureBackend, CaptureConfig, CapturedBlock};
pub use capture::{CapturePipeline, EndSink, FrameAssembler, FrameSink};
pub use microphone::CpalMicrophone;
pub use pcm::{decode_pcm16, encode_pcm16};
