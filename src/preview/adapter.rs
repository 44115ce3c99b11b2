//! Turns decoder notifications into popup actions.

use tracing::debug;

use crate::decoder::{Bitmap, DecoderEvents, Region};
use crate::layout::FitToHost;

use super::presenter::{Host, MotionHandler, Popup};
use super::session::{SessionShared, View};

/// Listener wired to one session while its decoder runs on the UI thread.
/// Every notification is a no-op once the session is finalized.
pub(crate) struct DecoderAdapter<'a, H: Host> {
    pub host: &'a H,
    pub fit_fraction: f64,
    pub shared: &'a SessionShared,
    pub view: &'a mut View<H::Popup>,
    pub motion: Option<MotionHandler>,
}

impl<H: Host> DecoderEvents for DecoderAdapter<'_, H> {
    fn size_prepared(&mut self, width: i32, height: i32) -> (i32, i32) {
        if self.shared.is_finalized() {
            return (width, height);
        }
        let (host_w, host_h) = self.host.host_size();
        let fitted = FitToHost::new(host_w, host_h, self.fit_fraction).apply(width, height);
        debug!(
            session = self.shared.id(),
            width,
            height,
            host_w,
            host_h,
            fitted_w = fitted.0,
            fitted_h = fitted.1,
            "Fitting preview to host"
        );
        fitted
    }

    fn area_prepared(&mut self, bitmap: &Bitmap) {
        if self.shared.is_finalized() || self.view.popup.is_some() {
            return;
        }
        let Some(motion) = self.motion.take() else {
            return;
        };
        debug!(session = self.shared.id(), "Showing preview popup");
        self.view.popup = Some(self.host.create_popup(bitmap, motion));
    }

    fn area_updated(&mut self, region: Region) {
        if self.shared.is_finalized() {
            return;
        }
        if let Some(popup) = self.view.popup.as_ref() {
            popup.invalidate(region);
        }
    }
}
