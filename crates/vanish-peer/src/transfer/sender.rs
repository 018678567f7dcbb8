//! Sending side of the file-transfer protocol

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use vanish_core::crypto::generate_transfer_id;
use vanish_core::{
    chunk_count, ControlFrame, SessionKey, TransferError, CHUNK_SIZE, HIGH_WATER_MARK,
    LOW_WATER_MARK, MAX_FILE_SIZE,
};

use crate::transport::DataChannel;

/// Progress callback for transfer updates
pub type ProgressCallback = Box<dyn Fn(SendProgress) + Send + Sync>;

/// Snapshot of an outgoing transfer's progress
#[derive(Debug, Clone)]
pub struct SendProgress {
    pub transfer_id: String,
    pub bytes_sent: u64,
    pub total_bytes: u64,
    pub chunks_sent: u32,
    pub total_chunks: u32,
}

impl SendProgress {
    /// Calculate completion percentage
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            100.0
        } else {
            (self.bytes_sent as f64 / self.total_bytes as f64) * 100.0
        }
    }
}

/// A payload queued for sending, already read into memory
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Clears the single-transfer flag when the send path exits, on any path
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sends one file at a time over an open data channel.
///
/// No multiplexing: a second `send` while one is active is rejected. A
/// mid-transfer failure aborts only that transfer; the channel stays open.
pub struct FileSender<C: DataChannel> {
    channel: Arc<C>,
    key: SessionKey,
    in_flight: Arc<AtomicBool>,
    progress: Option<ProgressCallback>,
}

impl<C: DataChannel> FileSender<C> {
    pub fn new(channel: Arc<C>, key: SessionKey) -> Self {
        Self {
            channel,
            key,
            in_flight: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    /// Register a progress callback invoked after every chunk
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Whether a transfer is currently active
    pub fn is_sending(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Send one file. Returns the transfer id on success.
    pub async fn send(&self, file: OutgoingFile) -> Result<String, TransferError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TransferError::TransferAlreadyInProgress);
        }
        let _guard = InFlightGuard(self.in_flight.clone());

        let total_bytes = file.data.len() as u64;
        if total_bytes > MAX_FILE_SIZE {
            return Err(TransferError::FileTooLarge { size: total_bytes });
        }
        if !self.channel.is_open() {
            return Err(TransferError::ChannelNotReady);
        }

        let transfer_id = generate_transfer_id();
        let total_chunks = chunk_count(total_bytes);

        debug!(
            "Starting transfer {} ({} bytes, {} chunks)",
            transfer_id, total_bytes, total_chunks
        );

        // The receiver pre-allocates its slot array from this frame, so it
        // must precede any binary data
        let start = ControlFrame::FileStart {
            transfer_id: transfer_id.clone(),
            name: file.name.clone(),
            size: total_bytes,
            total_chunks,
            mime_type: file.mime_type.clone(),
        };
        self.send_control(&start).await?;

        let mut bytes_sent: u64 = 0;
        for (index, chunk) in file.data.chunks(CHUNK_SIZE).enumerate() {
            // Bound the transport's internal send queue: wait for the
            // one-shot drain notification once the high-water mark is hit
            if self.channel.buffered_amount() > HIGH_WATER_MARK {
                self.channel.drained(LOW_WATER_MARK).await;
            }

            let frame = self.key.seal_chunk(chunk).map_err(TransferError::from)?;
            if self.channel.send_binary(frame).await.is_err() {
                warn!("Transfer {} failed at chunk {}", transfer_id, index);
                return Err(TransferError::TransferFailed(format!(
                    "channel closed at chunk {}",
                    index
                )));
            }

            bytes_sent += chunk.len() as u64;
            if let Some(callback) = &self.progress {
                callback(SendProgress {
                    transfer_id: transfer_id.clone(),
                    bytes_sent,
                    total_bytes,
                    chunks_sent: index as u32 + 1,
                    total_chunks,
                });
            }
        }

        self.send_control(&ControlFrame::FileEnd {
            transfer_id: transfer_id.clone(),
        })
        .await?;

        debug!("Transfer {} complete", transfer_id);
        Ok(transfer_id)
    }

    async fn send_control(&self, frame: &ControlFrame) -> Result<(), TransferError> {
        let json = frame
            .to_json()
            .map_err(|e| TransferError::TransferFailed(e.to_string()))?;
        self.channel
            .send_text(json)
            .await
            .map_err(|_| TransferError::TransferFailed("channel closed".into()))
    }
}
