//! Hover previews for image URLs.
//!
//! - `start` validates the target, supersedes the current preview and hands
//!   the transfer to the fetch pool
//! - body chunks come back to the UI thread one at a time through the UI queue
//! - the decoder's notifications size, create and repaint the popup
//! - `end` cancels; the worker's terminal task releases whatever `end` could not

pub mod adapter;
pub mod fetcher;
pub mod handoff;
pub mod presenter;
pub mod session;

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::config::PreviewConfig;
use crate::decoder::{DecoderFactory, ProgressiveDecoder, RasterDecoder};
use crate::error::{PreviewError, TransportError};
use crate::pool::WorkerPool;
use crate::target::check_image_url;
use crate::transport::{FetchRequest, HttpTransport, Transport};

use adapter::DecoderAdapter;
use fetcher::Fetch;
pub use handoff::{UiQueue, UiTask};
pub use presenter::{Host, MotionHandler, PointerTracker, Popup};
use session::Session;
pub use session::{SessionId, SessionShared, SessionState, TransferOutcome};

/// The preview slot of one host widget. Cheap to clone; all clones share
/// state. Must stay on the UI thread.
pub struct Previewer<H: Host> {
    inner: Rc<Inner<H>>,
}

impl<H: Host> Clone for Previewer<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Handle that does not keep the previewer alive.
pub struct WeakPreviewer<H: Host>(Weak<Inner<H>>);

impl<H: Host> WeakPreviewer<H> {
    pub fn upgrade(&self) -> Option<Previewer<H>> {
        self.0.upgrade().map(|inner| Previewer { inner })
    }
}

struct Inner<H: Host> {
    host: H,
    config: PreviewConfig,
    transport: Arc<dyn Transport>,
    decoders: DecoderFactory,
    pool: WorkerPool,
    ui_tx: UiQueue,
    ui_rx: async_channel::Receiver<UiTask>,
    /// Timer runtime for `dispatch_next`, built on first use.
    waiter: OnceCell<tokio::runtime::Runtime>,
    /// The session currently owned by the host, if any.
    current: Cell<Option<SessionId>>,
    /// Every session not yet freed, including ended ones the worker still holds.
    sessions: RefCell<HashMap<SessionId, Session<H::Popup>>>,
    next_id: Cell<SessionId>,
}

impl<H: Host> Previewer<H> {
    pub fn new(
        host: H,
        config: PreviewConfig,
        transport: Arc<dyn Transport>,
        decoders: DecoderFactory,
    ) -> Self {
        let (ui_tx, ui_rx) = async_channel::unbounded();
        let pool = WorkerPool::new(config.workers);
        Self {
            inner: Rc::new(Inner {
                host,
                config,
                transport,
                decoders,
                pool,
                ui_tx,
                ui_rx,
                waiter: OnceCell::new(),
                current: Cell::new(None),
                sessions: RefCell::new(HashMap::new()),
                next_id: Cell::new(1),
            }),
        }
    }

    /// HTTP transport and the PNG/JPEG decoder.
    pub fn with_defaults(host: H, config: PreviewConfig) -> Result<Self, TransportError> {
        let transport = Arc::new(HttpTransport::new()?);
        Ok(Self::new(
            host,
            config,
            transport,
            Box::new(|| Box::new(RasterDecoder::new()) as Box<dyn ProgressiveDecoder>),
        ))
    }

    /// Receiving end of the UI queue, for hosts that drive it from their own
    /// event loop.
    pub fn receiver(&self) -> async_channel::Receiver<UiTask> {
        self.inner.ui_rx.clone()
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.inner.current.get()
    }

    /// Number of sessions not yet freed.
    pub fn live_sessions(&self) -> usize {
        self.inner.sessions.borrow().len()
    }

    pub fn session_state(&self, id: SessionId) -> Option<SessionState> {
        self.inner.sessions.borrow().get(&id).map(|s| s.state)
    }

    /// Begin previewing `word` if it looks like an image URL.
    pub fn start(&self, word: &str) {
        let url = match check_image_url(word, &self.inner.config.extensions) {
            Ok(url) => url,
            Err(e) => {
                trace!(word, error = %e, "Not previewing");
                return;
            }
        };

        if self.inner.current.get().is_some() {
            self.end();
        }

        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);

        let shared = Arc::new(SessionShared::new(id));
        let session = Session::new(
            Arc::clone(&shared),
            (self.inner.decoders)(),
            self.inner.config.dismiss_distance,
        );
        self.inner.sessions.borrow_mut().insert(id, session);
        self.inner.current.set(Some(id));

        let fetch = Fetch {
            shared,
            request: FetchRequest::get(url)
                .with_header("User-Agent", self.inner.config.user_agent.as_str()),
            transport: Arc::clone(&self.inner.transport),
            queue: self.inner.ui_tx.clone(),
        };

        debug!(session = id, url, "Starting preview");
        if !self.inner.pool.submit(move || fetch.run()) {
            warn!(session = id, "Fetch pool unavailable, dropping preview");
            self.end();
            self.free(id);
        }
    }

    /// Cancel the current preview, if any.
    pub fn end(&self) {
        let Some(id) = self.inner.current.take() else {
            return;
        };
        let mut sessions = self.inner.sessions.borrow_mut();
        let Some(session) = sessions.get_mut(&id) else {
            return;
        };

        session.shared.finalize();
        if let Some(popup) = session.view.popup.take() {
            popup.destroy();
        }

        if session.is_completed() {
            sessions.remove(&id);
            debug!(session = id, "Preview ended and freed");
        } else {
            if let Some(mut decoder) = session.decoder.take() {
                decoder.abort();
            }
            session.state = SessionState::Finalizing;
            debug!(session = id, "Preview ended, waiting for worker");
        }
    }

    /// Run one task from the UI queue.
    pub fn dispatch(&self, task: UiTask) {
        match task {
            UiTask::Chunk {
                session,
                bytes,
                reply,
            } => {
                let accepted = self.feed(session, &bytes);
                let _ = reply.send(accepted);
            }
            UiTask::Finished { session, outcome } => self.finish(session, outcome),
        }
    }

    /// Run every task currently queued without waiting. Returns how many ran.
    pub fn dispatch_pending(&self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.inner.ui_rx.try_recv() {
            self.dispatch(task);
            count += 1;
        }
        count
    }

    /// Wait up to `timeout` for one task and run it. Returns false on timeout.
    ///
    /// For hosts without an event loop of their own; GTK hosts use
    /// `ui::attach` instead.
    pub fn dispatch_next(&self, timeout: Duration) -> bool {
        let Some(waiter) = self.waiter() else {
            return false;
        };
        let next = waiter.block_on(async {
            tokio::time::timeout(timeout, self.inner.ui_rx.recv()).await
        });
        match next {
            Ok(Ok(task)) => {
                self.dispatch(task);
                true
            }
            Ok(Err(_)) | Err(_) => false,
        }
    }

    fn waiter(&self) -> Option<&tokio::runtime::Runtime> {
        if self.inner.waiter.get().is_none() {
            match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(runtime) => {
                    let _ = self.inner.waiter.set(runtime);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to build dispatch runtime");
                    return None;
                }
            }
        }
        self.inner.waiter.get()
    }

    /// Pointer moved over the popup of session `id`.
    pub fn pointer_motion(&self, id: SessionId, x: f64, y: f64) {
        let dismiss = {
            let mut sessions = self.inner.sessions.borrow_mut();
            let Some(session) = sessions.get_mut(&id) else {
                return;
            };
            if session.shared.is_finalized() {
                return;
            }
            session.view.pointer.observe(x, y)
        };
        if dismiss && self.inner.current.get() == Some(id) {
            debug!(session = id, "Pointer left preview origin, dismissing");
            self.end();
        }
    }

    pub fn downgrade(&self) -> WeakPreviewer<H> {
        WeakPreviewer(Rc::downgrade(&self.inner))
    }

    fn motion_handler(&self, id: SessionId) -> MotionHandler {
        let weak = self.downgrade();
        Box::new(move |x, y| {
            if let Some(previewer) = weak.upgrade() {
                previewer.pointer_motion(id, x, y);
            }
        })
    }

    /// Feed one chunk to the session's decoder. Returns false to abort the
    /// transfer.
    fn feed(&self, id: SessionId, bytes: &[u8]) -> bool {
        let motion = self.motion_handler(id);
        let mut sessions = self.inner.sessions.borrow_mut();
        let Some(session) = sessions.get_mut(&id) else {
            return false;
        };
        if session.shared.is_finalized() {
            trace!(session = id, error = %PreviewError::Cancelled, "Dropping chunk");
            return false;
        }

        let Session {
            shared,
            decoder,
            view,
            ..
        } = session;
        let Some(decoder) = decoder.as_mut() else {
            return false;
        };
        let mut adapter = DecoderAdapter {
            host: &self.inner.host,
            fit_fraction: self.inner.config.fit_fraction,
            shared: shared.as_ref(),
            view,
            motion: Some(motion),
        };

        match decoder.write(bytes, &mut adapter) {
            Ok(()) => {
                trace!(session = id, len = bytes.len(), "Fed chunk to decoder");
                true
            }
            Err(e) => {
                warn!(session = id, error = %PreviewError::from(e), "Decoder rejected chunk");
                false
            }
        }
    }

    /// Terminal task from the worker. Releases the session unless it ends
    /// up completed and on screen.
    fn finish(&self, id: SessionId, outcome: TransferOutcome) {
        let finalized = match self.inner.sessions.borrow().get(&id) {
            Some(session) => session.shared.is_finalized(),
            None => {
                warn!(session = id, "Transfer finished for unknown session");
                return;
            }
        };

        if finalized || matches!(outcome, TransferOutcome::Skipped) {
            self.free(id);
            return;
        }

        if let TransferOutcome::Failed(e) = outcome {
            let error = PreviewError::from(e);
            if error.is_cancelled() {
                debug!(session = id, "Transfer aborted");
            } else {
                warn!(session = id, %error, "Preview transfer failed");
            }
            self.end();
            self.free(id);
            return;
        }

        let shown = self.close_decoder(id);
        if !shown {
            self.end();
            self.free(id);
            return;
        }

        if let Some(session) = self.inner.sessions.borrow_mut().get_mut(&id) {
            session.state = SessionState::Completed;
            debug!(session = id, "Preview complete");
        }
    }

    /// Closes the decoder after a successful transfer. True when the close
    /// succeeded and a popup exists.
    fn close_decoder(&self, id: SessionId) -> bool {
        let motion = self.motion_handler(id);
        let mut sessions = self.inner.sessions.borrow_mut();
        let Some(session) = sessions.get_mut(&id) else {
            return false;
        };
        let Some(mut decoder) = session.decoder.take() else {
            return false;
        };

        let mut adapter = DecoderAdapter {
            host: &self.inner.host,
            fit_fraction: self.inner.config.fit_fraction,
            shared: session.shared.as_ref(),
            view: &mut session.view,
            motion: Some(motion),
        };
        let closed = match decoder.close(&mut adapter) {
            Ok(()) => true,
            Err(e) => {
                warn!(session = id, error = %PreviewError::from(e), "Decoder close failed");
                false
            }
        };
        drop(decoder);

        closed && session.view.popup.is_some()
    }

    /// Drop the session record. Runs once per session.
    fn free(&self, id: SessionId) {
        let removed = self.inner.sessions.borrow_mut().remove(&id);
        if let Some(session) = removed {
            if let Some(popup) = session.view.popup.as_ref() {
                popup.destroy();
            }
            if self.inner.current.get() == Some(id) {
                self.inner.current.set(None);
            }
            debug!(session = id, "Preview session freed");
        }
    }
}

impl<H: Host> Drop for Inner<H> {
    fn drop(&mut self) {
        for session in self.sessions.get_mut().values_mut() {
            session.shared.finalize();
            if let Some(popup) = session.view.popup.take() {
                popup.destroy();
            }
        }
        // Workers blocked on a chunk wake up once its reply sender is dropped.
        self.ui_rx.close();
        while self.ui_rx.try_recv().is_ok() {}
    }
}
