//! GTK4 host for previews.

pub mod popup;

use gtk4::glib;

use crate::preview::{Host, Previewer};

pub use popup::{GtkHost, GtkPopup};

/// Drain the previewer's UI queue on the GTK main context.
///
/// The loop stops once the previewer is dropped.
pub fn attach<H: Host>(previewer: &Previewer<H>) {
    let receiver = previewer.receiver();
    let previewer_weak = previewer.downgrade();
    glib::spawn_future_local(async move {
        while let Ok(task) = receiver.recv().await {
            if let Some(previewer) = previewer_weak.upgrade() {
                previewer.dispatch(task);
            } else {
                break;
            }
        }
    });
}
