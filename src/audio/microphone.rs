//! Microphone capture via cpal.
//!
//! `cpal::Stream` is `!Send` on macOS and Windows, so the stream is opened,
//! played and dropped on a dedicated device thread. Open success or failure is
//! reported back to `start()` over a oneshot channel.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{CaptureBackend, CaptureConfig, CapturedBlock};
use crate::error::{ClientError, Result};

/// Default-input-device capture backend
pub struct CpalMicrophone {
    worker: Option<DeviceThread>,
}

struct DeviceThread {
    stop_tx: std_mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl CpalMicrophone {
    pub fn new() -> Self {
        Self { worker: None }
    }
}

impl Default for CpalMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CaptureBackend for CpalMicrophone {
    async fn start(&mut self, config: &CaptureConfig) -> Result<mpsc::Receiver<CapturedBlock>> {
        if self.worker.is_some() {
            warn!("Microphone already capturing, releasing previous stream first");
            self.stop().await;
        }

        let (block_tx, block_rx) = mpsc::channel(config.queue_depth.max(1));
        let (open_tx, open_rx) = oneshot::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let stream = match open_input_stream(block_tx) {
                    Ok(stream) => {
                        let _ = open_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };

                // Park until stop() is called or the backend is dropped.
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Microphone stream released");
            })
            .map_err(|e| ClientError::Device(format!("failed to spawn capture thread: {}", e)))?;

        match open_rx.await {
            Ok(Ok(())) => {
                self.worker = Some(DeviceThread { stop_tx, handle });
                info!("Microphone capture started");
                Ok(block_rx)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(ClientError::Device(
                    "capture thread exited before opening the device".to_string(),
                ))
            }
        }
    }

    async fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        let _ = worker.stop_tx.send(());
        match tokio::task::spawn_blocking(move || worker.handle.join()).await {
            Ok(Ok(())) => info!("Microphone capture stopped"),
            Ok(Err(_)) => error!("Capture thread panicked during shutdown"),
            Err(e) => error!("Failed to join capture thread: {}", e),
        }
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
        }
    }
}

fn open_input_stream(block_tx: mpsc::Sender<CapturedBlock>) -> Result<Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| ClientError::Device("no input device available".to_string()))?;

    info!(
        "Using input device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let supported = device
        .default_input_config()
        .map_err(|e| classify(format!("failed to get input config: {}", e)))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();

    info!(
        "Input config: {}Hz, {} channels, {:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, block_tx),
        SampleFormat::I16 => build_stream::<i16>(&device, &config, block_tx),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, block_tx),
        other => {
            return Err(ClientError::Device(format!(
                "unsupported sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| classify(format!("failed to build input stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| classify(format!("failed to start input stream: {}", e)))?;

    Ok(stream)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    block_tx: mpsc::Sender<CapturedBlock>,
) -> std::result::Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let block = CapturedBlock {
                samples: data.iter().map(|s| s.to_sample::<f32>()).collect(),
                sample_rate,
                channels,
            };
            if let Err(e) = block_tx.try_send(block) {
                debug!("Dropping capture block: {}", e);
            }
        },
        |err| error!("Audio input stream error: {}", err),
        None,
    )
}

/// Map a cpal failure description onto the permission/device split.
///
/// cpal reports OS permission denials as backend-specific errors, so the
/// message text is the only signal available.
pub(crate) fn classify(description: String) -> ClientError {
    let lowered = description.to_ascii_lowercase();
    if lowered.contains("permission")
        || lowered.contains("denied")
        || lowered.contains("not authorized")
        || lowered.contains("unauthorized")
    {
        ClientError::Permission(description)
    } else {
        ClientError::Device(description)
    }
}
