//! Progressive hover previews for image URLs.
//!
//! A [`Previewer`] owns the preview slot of one host widget. `start` fetches
//! the image on a worker pool, streams it chunk by chunk into a decoder on the
//! UI thread and shows a popup as soon as the first frame exists; `end`
//! cancels at any point.

pub mod config;
pub mod decoder;
pub mod error;
pub mod layout;
pub mod pool;
pub mod preview;
pub mod target;
pub mod transport;
#[cfg(feature = "gtk")]
pub mod ui;

pub use config::PreviewConfig;
pub use error::{DecodeError, PreviewError, PreviewResult, TransportError};
pub use preview::{Host, Popup, Previewer};
