//! Worker-to-UI rendezvous for body chunks.
//!
//! Each chunk is posted to the UI queue with a single-slot reply channel and
//! the worker blocks until the UI thread has fed it to the decoder. The
//! network layer therefore never runs ahead of decoding.

use std::sync::Arc;

use tracing::trace;

use super::session::{SessionId, SessionShared, TransferOutcome};

/// Work posted onto the UI thread.
pub enum UiTask {
    /// Feed `bytes` to the session's decoder and answer on `reply`.
    Chunk {
        session: SessionId,
        bytes: Vec<u8>,
        reply: flume::Sender<bool>,
    },
    /// The worker is done with the session. Posted exactly once per session.
    Finished {
        session: SessionId,
        outcome: TransferOutcome,
    },
}

pub type UiQueue = async_channel::Sender<UiTask>;

pub(crate) struct Handoff<'a> {
    shared: &'a Arc<SessionShared>,
    queue: &'a UiQueue,
}

impl<'a> Handoff<'a> {
    pub fn new(shared: &'a Arc<SessionShared>, queue: &'a UiQueue) -> Self {
        Self { shared, queue }
    }

    /// Write sink body. Returns `chunk.len()` to continue or 0 to abort.
    pub fn deliver(&self, chunk: &[u8]) -> usize {
        if self.shared.is_finalized() {
            trace!(session = self.shared.id(), "Session finalized, aborting transfer");
            return 0;
        }

        let (reply_tx, reply_rx) = flume::bounded(1);
        let task = UiTask::Chunk {
            session: self.shared.id(),
            bytes: chunk.to_vec(),
            reply: reply_tx,
        };
        if self.queue.send_blocking(task).is_err() {
            return 0;
        }

        // A dropped reply means the UI queue went away; treat it as failure.
        match reply_rx.recv() {
            Ok(true) => chunk.len(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_finalized_session_never_posts() {
        let (tx, rx) = async_channel::unbounded();
        let shared = Arc::new(SessionShared::new(1));
        shared.finalize();
        assert_eq!(Handoff::new(&shared, &tx).deliver(b"abc"), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_blocks_until_ui_answers() {
        let (tx, rx) = async_channel::unbounded::<UiTask>();
        let shared = Arc::new(SessionShared::new(3));

        let worker = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let handoff = Handoff::new(&shared, &tx);
                (handoff.deliver(b"first"), handoff.deliver(b"second"))
            })
        };

        let mut seen = Vec::new();
        for answer in [true, false] {
            match rx.recv_blocking().unwrap() {
                UiTask::Chunk {
                    session,
                    bytes,
                    reply,
                } => {
                    assert_eq!(session, 3);
                    seen.push(bytes);
                    reply.send(answer).unwrap();
                }
                UiTask::Finished { .. } => panic!("unexpected finish"),
            }
        }

        assert_eq!(worker.join().unwrap(), (5, 0));
        assert_eq!(seen, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn test_dropped_reply_aborts() {
        let (tx, rx) = async_channel::unbounded::<UiTask>();
        let shared = Arc::new(SessionShared::new(4));
        let worker = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || Handoff::new(&shared, &tx).deliver(b"data"))
        };
        drop(rx.recv_blocking().unwrap());
        assert_eq!(worker.join().unwrap(), 0);
    }

    #[test]
    fn test_closed_queue_aborts() {
        let (tx, rx) = async_channel::unbounded::<UiTask>();
        rx.close();
        let shared = Arc::new(SessionShared::new(5));
        assert_eq!(Handoff::new(&shared, &tx).deliver(b"data"), 0);
    }
}
