use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::cursor::PlaybackCursor;
use super::decoder::{ChunkDecoder, CompressedChunk};
use super::output::PlaybackOutput;

/// Counters for the playback worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackStats {
    /// Chunks decoded and placed on the output clock
    pub scheduled: u64,
    /// Chunks skipped because decode or scheduling failed
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    scheduled: AtomicU64,
    failed: AtomicU64,
}

/// Sequential decode→schedule queue for inbound audio chunks.
///
/// A single worker owns the playback cursor and handles one chunk at a time,
/// so chunk N+1 is never placed before chunk N regardless of how long each
/// decode takes.
pub struct PlaybackScheduler {
    tx: mpsc::UnboundedSender<CompressedChunk>,
    worker: JoinHandle<()>,
    next_sequence: AtomicU64,
    counters: Arc<Counters>,
}

impl PlaybackScheduler {
    /// Start the worker. `epsilon` is the minimum lead (seconds) over the output clock.
    pub fn spawn(
        decoder: Arc<dyn ChunkDecoder>,
        output: Arc<dyn PlaybackOutput>,
        epsilon: f64,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<CompressedChunk>();
        let counters = Arc::new(Counters::default());
        let worker_counters = Arc::clone(&counters);

        let worker = tokio::spawn(async move {
            let mut cursor = PlaybackCursor::new();
            info!("Playback worker started (epsilon={:.3}s)", epsilon);

            while let Some(chunk) = rx.recv().await {
                let audio = match decoder.decode(&chunk).await {
                    Ok(audio) => audio,
                    Err(e) => {
                        warn!("Skipping chunk {}: {}", chunk.sequence, e);
                        worker_counters.failed.fetch_add(1, Ordering::SeqCst);
                        continue;
                    }
                };

                let duration = audio.duration();
                let now = output.now();
                let start = cursor.place(now, duration, epsilon);

                if let Err(e) = output.schedule(audio, start) {
                    error!("Failed to schedule chunk {}: {}", chunk.sequence, e);
                    worker_counters.failed.fetch_add(1, Ordering::SeqCst);
                    continue;
                }

                worker_counters.scheduled.fetch_add(1, Ordering::SeqCst);
                debug!(
                    "Chunk {} scheduled at {:.3}s for {:.3}s (now={:.3}s)",
                    chunk.sequence, start, duration, now
                );
            }

            info!("Playback worker stopped");
        });

        Self {
            tx,
            worker,
            next_sequence: AtomicU64::new(0),
            counters,
        }
    }

    /// Queue a compressed chunk behind everything already queued.
    ///
    /// Returns the chunk's sequence number, or `None` if the worker has stopped.
    pub fn enqueue(&self, bytes: Vec<u8>) -> Option<u64> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        match self.tx.send(CompressedChunk { sequence, bytes }) {
            Ok(()) => Some(sequence),
            Err(_) => {
                warn!("Playback worker is gone, dropping chunk {}", sequence);
                None
            }
        }
    }

    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            scheduled: self.counters.scheduled.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        }
    }

    /// Stop accepting chunks, finish the ones already queued, and return final stats
    pub async fn shutdown(self) -> PlaybackStats {
        let PlaybackScheduler {
            tx,
            worker,
            counters,
            ..
        } = self;
        drop(tx);

        if let Err(e) = worker.await {
            error!("Playback worker panicked: {}", e);
        }

        PlaybackStats {
            scheduled: counters.scheduled.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
        }
    }
}
