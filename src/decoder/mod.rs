//! Progressive image decoding.
//!
//! A decoder consumes the body as it arrives and reports back through
//! [`DecoderEvents`], synchronously from inside `write`/`close`:
//! - `size_prepared` once the header is parsed; the listener picks the output size
//! - `area_prepared` once a displayable bitmap exists
//! - `area_updated` whenever a rectangle of that bitmap receives pixels

pub mod raster;

use std::sync::Arc;

use image::RgbaImage;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::DecodeError;

pub use raster::RasterDecoder;

/// A rectangle of the bitmap, in bitmap pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Shared RGBA surface the decoder paints into and the popup reads from.
#[derive(Debug, Clone)]
pub struct Bitmap(Arc<RwLock<RgbaImage>>);

impl Bitmap {
    /// Fully transparent bitmap.
    pub fn new(width: u32, height: u32) -> Self {
        Self(Arc::new(RwLock::new(RgbaImage::new(width, height))))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.read().dimensions()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, RgbaImage> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, RgbaImage> {
        self.0.write()
    }
}

/// Listener for decoder notifications.
pub trait DecoderEvents {
    /// The source is `width` x `height`. Returns the size to decode to.
    fn size_prepared(&mut self, width: i32, height: i32) -> (i32, i32);

    /// A bitmap at the negotiated size now exists.
    fn area_prepared(&mut self, bitmap: &Bitmap);

    /// `region` of the bitmap has new pixels.
    fn area_updated(&mut self, region: Region);
}

pub trait ProgressiveDecoder {
    /// Feeds the next piece of the encoded image.
    fn write(&mut self, buf: &[u8], events: &mut dyn DecoderEvents) -> Result<(), DecodeError>;

    /// Signals end of input. Fails if the image is incomplete or corrupt.
    fn close(&mut self, events: &mut dyn DecoderEvents) -> Result<(), DecodeError>;

    /// Drops buffered input without decoding it. No notifications follow.
    fn abort(&mut self);
}

/// Builds a fresh decoder for each preview session.
pub type DecoderFactory = Box<dyn Fn() -> Box<dyn ProgressiveDecoder>>;
