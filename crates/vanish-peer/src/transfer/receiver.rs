//! Receiving side of the file-transfer protocol
//!
//! Chunks arrive in send order on the ordered channel, but their decryptions
//! run concurrently and may complete in any order. Each chunk's destination
//! slot is captured from the next-index counter before its decrypt is
//! started, and assembly waits until the end-of-stream frame has been seen
//! AND no decrypts remain in flight. That closes the race where `file-end`
//! (a small text frame) overtakes the last, slower-to-decrypt binary chunks.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use vanish_core::{ControlFrame, SessionKey};

/// A fully reassembled incoming payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFile {
    pub transfer_id: String,
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Observable receiver phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    /// No active transfer
    Idle,
    /// Metadata received, chunks arriving
    Receiving,
    /// End frame seen, decrypts still in flight
    Draining,
}

/// State for one active transfer
struct ActiveTransfer {
    transfer_id: String,
    name: String,
    mime_type: String,
    /// Fixed-length once allocated; each slot is written at most once
    slots: Vec<Option<Vec<u8>>>,
    /// Slot index for the next arriving chunk frame
    next_index: usize,
    /// Successfully decrypted chunks
    received: usize,
    /// Decrypts started but not yet finished
    pending: usize,
    /// `file-end` has been seen
    end_seen: bool,
}

struct Inner {
    /// Bumped on every reset so stale decrypt completions from an abandoned
    /// transfer cannot touch a newer one's counters
    generation: u64,
    active: Option<ActiveTransfer>,
}

/// Reassembles incoming transfers and emits completed payloads.
///
/// Cheap to clone into the data-channel callback context.
#[derive(Clone)]
pub struct FileReceiver {
    key: SessionKey,
    inner: Arc<Mutex<Inner>>,
    completed_tx: UnboundedSender<CompletedFile>,
}

impl FileReceiver {
    /// Create a receiver and the stream of completed files
    pub fn new(key: SessionKey) -> (Self, UnboundedReceiver<CompletedFile>) {
        let (completed_tx, completed_rx) = mpsc::unbounded_channel();
        (
            Self {
                key,
                inner: Arc::new(Mutex::new(Inner {
                    generation: 0,
                    active: None,
                })),
                completed_tx,
            },
            completed_rx,
        )
    }

    /// Current phase of the receiver
    pub fn phase(&self) -> TransferPhase {
        let inner = self.inner.lock();
        match &inner.active {
            None => TransferPhase::Idle,
            Some(t) if t.end_seen => TransferPhase::Draining,
            Some(_) => TransferPhase::Receiving,
        }
    }

    /// Handle a text (control) frame from the data channel
    pub fn handle_text(&self, text: &str) {
        let frame = match ControlFrame::from_json(text) {
            Ok(f) => f,
            Err(e) => {
                debug!("Ignoring malformed control frame: {}", e);
                return;
            }
        };

        match frame {
            ControlFrame::FileStart {
                transfer_id,
                name,
                size,
                total_chunks,
                mime_type,
            } => {
                let mut inner = self.inner.lock();
                if inner.active.is_some() {
                    warn!("file-start while a transfer was active; resetting");
                }
                // Reset replaces any prior state; the slot array is sized
                // exactly to the declared chunk count
                inner.generation += 1;
                inner.active = Some(ActiveTransfer {
                    transfer_id,
                    name,
                    mime_type,
                    slots: vec![None; total_chunks as usize],
                    next_index: 0,
                    received: 0,
                    pending: 0,
                    end_seen: false,
                });
                debug!("Transfer started: {} chunks, {} bytes declared", total_chunks, size);
            }

            ControlFrame::FileEnd { transfer_id } => {
                let mut inner = self.inner.lock();
                match &mut inner.active {
                    Some(t) if t.transfer_id == transfer_id => {
                        t.end_seen = true;
                        Self::try_assemble(&mut inner, &self.completed_tx);
                    }
                    _ => debug!("file-end for unknown transfer {}", transfer_id),
                }
            }
        }
    }

    /// Handle a binary (chunk) frame from the data channel.
    ///
    /// The slot index is captured and the counter advanced before the
    /// decrypt is started; the decrypted bytes are written into that slot
    /// regardless of when the decrypt completes.
    pub fn handle_binary(&self, frame: Vec<u8>) {
        let (index, generation) = {
            let mut inner = self.inner.lock();
            let generation = inner.generation;
            let Some(t) = &mut inner.active else {
                debug!("Dropping chunk frame with no active transfer");
                return;
            };
            let index = t.next_index;
            t.next_index += 1;
            t.pending += 1;
            (index, generation)
        };

        let receiver = self.clone();
        tokio::spawn(async move {
            let result = receiver.key.open_chunk(&frame);

            let mut inner = receiver.inner.lock();
            if inner.generation != generation {
                // Transfer was reset or abandoned while this decrypt ran
                return;
            }
            let Some(t) = &mut inner.active else {
                return;
            };

            t.pending -= 1;
            match result {
                Ok(plaintext) => {
                    if let Some(slot) = t.slots.get_mut(index) {
                        *slot = Some(plaintext);
                        t.received += 1;
                    } else {
                        warn!("Chunk index {} beyond declared slot count", index);
                    }
                }
                // A bad chunk is logged, not fatal to the transfer
                Err(e) => warn!("Chunk {} decrypt failed: {}", index, e),
            }

            Self::try_assemble(&mut inner, &receiver.completed_tx);
        });
    }

    /// Abandon any active transfer (channel closed). No partial file is
    /// ever exposed.
    pub fn abandon(&self) {
        let mut inner = self.inner.lock();
        if inner.active.take().is_some() {
            debug!("Transfer abandoned");
        }
        inner.generation += 1;
    }

    fn try_assemble(inner: &mut Inner, completed_tx: &UnboundedSender<CompletedFile>) {
        let ready = matches!(&inner.active, Some(t) if t.end_seen && t.pending == 0);
        if !ready {
            return;
        }

        let t = inner.active.take().expect("checked above");
        inner.generation += 1;

        let total: usize = t
            .slots
            .iter()
            .map(|s| s.as_ref().map_or(0, |c| c.len()))
            .sum();
        let mut data = Vec::with_capacity(total);
        // Unfilled slots should not occur under correct operation; skip
        // them rather than failing the whole transfer
        for slot in t.slots.into_iter().flatten() {
            data.extend_from_slice(&slot);
        }

        debug!("Transfer {} assembled: {} bytes", t.transfer_id, data.len());
        let _ = completed_tx.send(CompletedFile {
            transfer_id: t.transfer_id,
            name: t.name,
            mime_type: t.mime_type,
            data,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use vanish_core::{chunk_count, CHUNK_SIZE};

    fn key() -> SessionKey {
        SessionKey::from_bytes([3u8; 32])
    }

    fn start_frame(transfer_id: &str, size: u64) -> String {
        ControlFrame::FileStart {
            transfer_id: transfer_id.into(),
            name: "payload.bin".into(),
            size,
            total_chunks: chunk_count(size),
            mime_type: "application/octet-stream".into(),
        }
        .to_json()
        .unwrap()
    }

    fn end_frame(transfer_id: &str) -> String {
        ControlFrame::FileEnd {
            transfer_id: transfer_id.into(),
        }
        .to_json()
        .unwrap()
    }

    /// Pseudorandom payload so chunk boundaries are visible in assertions
    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    async fn recv_completed(rx: &mut UnboundedReceiver<CompletedFile>) -> CompletedFile {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("assembly timed out")
            .expect("channel closed")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn multi_chunk_payload_reassembles_byte_identical() {
        let k = key();
        let (receiver, mut rx) = FileReceiver::new(k.clone());

        let data = payload(CHUNK_SIZE * 3 + 777);
        receiver.handle_text(&start_frame("t1", data.len() as u64));

        for chunk in data.chunks(CHUNK_SIZE) {
            receiver.handle_binary(k.seal_chunk(chunk).unwrap());
        }
        receiver.handle_text(&end_frame("t1"));

        let completed = recv_completed(&mut rx).await;
        assert_eq!(completed.transfer_id, "t1");
        assert_eq!(completed.name, "payload.bin");
        assert_eq!(completed.data, data);
        assert_eq!(receiver.phase(), TransferPhase::Idle);
    }

    #[tokio::test]
    async fn end_frame_overtaking_pending_decrypts_defers_assembly() {
        // Current-thread runtime: spawned decrypt tasks cannot run until
        // this test yields, so file-end always arrives with pending > 0
        let k = key();
        let (receiver, mut rx) = FileReceiver::new(k.clone());

        let data = payload(CHUNK_SIZE + 123);
        receiver.handle_text(&start_frame("t1", data.len() as u64));
        for chunk in data.chunks(CHUNK_SIZE) {
            receiver.handle_binary(k.seal_chunk(chunk).unwrap());
        }
        receiver.handle_text(&end_frame("t1"));

        // End seen, decrypts in flight: draining, nothing emitted yet
        assert_eq!(receiver.phase(), TransferPhase::Draining);
        assert!(rx.try_recv().is_err());

        let completed = recv_completed(&mut rx).await;
        assert_eq!(completed.data, data);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn decrypt_completion_order_does_not_affect_layout() {
        // Many small chunks maximize completion-order shuffling across
        // worker threads; byte-identity proves slot capture is immune
        let k = key();
        let (receiver, mut rx) = FileReceiver::new(k.clone());

        let data = payload(CHUNK_SIZE * 16);
        receiver.handle_text(&start_frame("t1", data.len() as u64));
        for chunk in data.chunks(CHUNK_SIZE) {
            receiver.handle_binary(k.seal_chunk(chunk).unwrap());
        }
        receiver.handle_text(&end_frame("t1"));

        let completed = recv_completed(&mut rx).await;
        assert_eq!(completed.data, data);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn single_chunk_and_empty_payloads() {
        let k = key();
        let (receiver, mut rx) = FileReceiver::new(k.clone());

        // One partial chunk
        let data = payload(100);
        receiver.handle_text(&start_frame("t1", 100));
        receiver.handle_binary(k.seal_chunk(&data).unwrap());
        receiver.handle_text(&end_frame("t1"));
        assert_eq!(recv_completed(&mut rx).await.data, data);

        // Zero-length payload: no chunk frames at all
        receiver.handle_text(&start_frame("t2", 0));
        receiver.handle_text(&end_frame("t2"));
        let completed = recv_completed(&mut rx).await;
        assert_eq!(completed.transfer_id, "t2");
        assert!(completed.data.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn corrupt_chunk_is_skipped_not_fatal() {
        let k = key();
        let (receiver, mut rx) = FileReceiver::new(k.clone());

        let data = payload(CHUNK_SIZE * 2);
        receiver.handle_text(&start_frame("t1", data.len() as u64));

        let mut first = k.seal_chunk(&data[..CHUNK_SIZE]).unwrap();
        let last = first.len() - 1;
        first[last] ^= 0xFF;
        receiver.handle_binary(first);
        receiver.handle_binary(k.seal_chunk(&data[CHUNK_SIZE..]).unwrap());
        receiver.handle_text(&end_frame("t1"));

        // The bad slot is skipped; the good chunk still comes through
        let completed = recv_completed(&mut rx).await;
        assert_eq!(completed.data, data[CHUNK_SIZE..]);
    }

    #[tokio::test]
    async fn chunk_without_file_start_is_dropped() {
        let k = key();
        let (receiver, mut rx) = FileReceiver::new(k.clone());

        receiver.handle_binary(k.seal_chunk(b"orphan").unwrap());
        tokio::task::yield_now().await;

        assert_eq!(receiver.phase(), TransferPhase::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn abandon_discards_partial_transfer_silently() {
        let k = key();
        let (receiver, mut rx) = FileReceiver::new(k.clone());

        let data = payload(CHUNK_SIZE);
        receiver.handle_text(&start_frame("t1", data.len() as u64));
        receiver.handle_binary(k.seal_chunk(&data).unwrap());
        assert_eq!(receiver.phase(), TransferPhase::Receiving);

        // Channel closed mid-transfer
        receiver.abandon();
        assert_eq!(receiver.phase(), TransferPhase::Idle);

        // Let the orphaned decrypt task finish; it must not emit anything
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn new_file_start_resets_previous_state() {
        let k = key();
        let (receiver, mut rx) = FileReceiver::new(k.clone());

        receiver.handle_text(&start_frame("old", CHUNK_SIZE as u64));
        receiver.handle_binary(k.seal_chunk(&payload(CHUNK_SIZE)).unwrap());

        // A fresh file-start replaces the half-received transfer
        let data = payload(50);
        receiver.handle_text(&start_frame("new", 50));
        receiver.handle_binary(k.seal_chunk(&data).unwrap());
        receiver.handle_text(&end_frame("new"));

        let completed = recv_completed(&mut rx).await;
        assert_eq!(completed.transfer_id, "new");
        assert_eq!(completed.data, data);
    }

    #[tokio::test]
    async fn end_frame_for_unknown_transfer_is_ignored() {
        let k = key();
        let (receiver, _rx) = FileReceiver::new(k.clone());

        receiver.handle_text(&start_frame("t1", 10));
        receiver.handle_text(&end_frame("other"));

        // Still receiving t1
        assert_eq!(receiver.phase(), TransferPhase::Receiving);
    }

    #[tokio::test]
    async fn malformed_control_frame_is_ignored() {
        let k = key();
        let (receiver, _rx) = FileReceiver::new(k);

        receiver.handle_text("not json at all");
        receiver.handle_text(r#"{"type":"file-pause"}"#);
        assert_eq!(receiver.phase(), TransferPhase::Idle);
    }
}
