use std::sync::Arc;

use tracing::{debug, trace};

use crate::transport::{FetchRequest, Transport};

use super::handoff::{Handoff, UiQueue, UiTask};
use super::session::{SessionShared, TransferOutcome};

/// Worker-side job for one session.
pub(crate) struct Fetch {
    pub shared: Arc<SessionShared>,
    pub request: FetchRequest,
    pub transport: Arc<dyn Transport>,
    pub queue: UiQueue,
}

impl Fetch {
    /// Runs the transfer on the calling (worker) thread, then posts the
    /// terminal task. Never touches UI state itself.
    pub fn run(self) {
        let Fetch {
            shared,
            request,
            transport,
            queue,
        } = self;

        let outcome = if shared.is_finalized() {
            debug!(session = shared.id(), "Session cancelled before transfer started");
            drop(request);
            TransferOutcome::Skipped
        } else {
            let handoff = Handoff::new(&shared, &queue);
            let result = transport.fetch(&request, &mut |chunk: &[u8]| handoff.deliver(chunk));
            drop(request);
            match result {
                Ok(()) => TransferOutcome::Completed,
                Err(e) => TransferOutcome::Failed(e),
            }
        };

        trace!(session = shared.id(), ?outcome, "Posting transfer result");
        let _ = queue.send_blocking(UiTask::Finished {
            session: shared.id(),
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::WriteSink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl Transport for Counting {
        fn fetch(
            &self,
            _request: &FetchRequest,
            _sink: &mut WriteSink<'_>,
        ) -> Result<(), TransportError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Status(404))
        }
    }

    #[test]
    fn test_skips_transfer_when_already_finalized() {
        let (tx, rx) = async_channel::unbounded();
        let transport = Arc::new(Counting(AtomicUsize::new(0)));
        let shared = Arc::new(SessionShared::new(9));
        shared.finalize();

        Fetch {
            shared,
            request: FetchRequest::get("http://example.com/a.png"),
            transport: transport.clone(),
            queue: tx,
        }
        .run();

        assert_eq!(transport.0.load(Ordering::SeqCst), 0);
        match rx.try_recv().unwrap() {
            UiTask::Finished { session, outcome } => {
                assert_eq!(session, 9);
                assert!(matches!(outcome, TransferOutcome::Skipped));
            }
            UiTask::Chunk { .. } => panic!("unexpected chunk"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_failure_is_reported_once() {
        let (tx, rx) = async_channel::unbounded();
        let transport = Arc::new(Counting(AtomicUsize::new(0)));

        Fetch {
            shared: Arc::new(SessionShared::new(2)),
            request: FetchRequest::get("http://example.com/a.png"),
            transport: transport.clone(),
            queue: tx,
        }
        .run();

        assert_eq!(transport.0.load(Ordering::SeqCst), 1);
        match rx.try_recv().unwrap() {
            UiTask::Finished { outcome, .. } => assert!(matches!(
                outcome,
                TransferOutcome::Failed(TransportError::Status(404))
            )),
            UiTask::Chunk { .. } => panic!("unexpected chunk"),
        }
        assert!(rx.try_recv().is_err());
    }
}
