//! PNG/JPEG decoder built on the image and png crates.
//!
//! Non-interlaced 8-bit PNGs are decoded row by row as bytes arrive; every
//! write paints the bitmap rows whose source rows are complete. JPEG and
//! interlaced PNG are buffered and decoded on `close`. Either way the size is
//! announced as soon as the header parses.

use std::cell::RefCell;
use std::io::{self, BufRead, Cursor, Read, Seek, SeekFrom};
use std::rc::Rc;

use image::imageops::FilterType;
use image::{ImageFormat, ImageReader, Rgba, RgbaImage};
use tracing::{debug, trace};

use super::{Bitmap, DecoderEvents, ProgressiveDecoder, Region};
use crate::error::DecodeError;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_SIGNATURE: &[u8] = b"\xff\xd8\xff";

#[derive(Default)]
pub struct RasterDecoder {
    /// Input not yet handed to a row reader.
    buffer: Vec<u8>,
    format: Option<ImageFormat>,
    bitmap: Option<Bitmap>,
    png: PngState,
    closed: bool,
}

#[derive(Default)]
enum PngState {
    /// Header not yet read far enough to decide.
    #[default]
    Pending,
    Streaming(Box<PngStream>),
    /// Interlaced or unusual layout; decoded on close.
    Buffered,
}

impl RasterDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifies the format from the leading bytes. `Ok(None)` means more
    /// bytes are needed.
    fn sniff(buf: &[u8]) -> Result<Option<ImageFormat>, DecodeError> {
        for (signature, format) in [
            (PNG_SIGNATURE, ImageFormat::Png),
            (JPEG_SIGNATURE, ImageFormat::Jpeg),
        ] {
            if buf.starts_with(signature) {
                return Ok(Some(format));
            }
            if signature.starts_with(buf) {
                return Ok(None);
            }
        }
        Err(DecodeError::UnsupportedFormat)
    }

    fn prepare(&mut self, format: ImageFormat, events: &mut dyn DecoderEvents) {
        let Ok((width, height)) =
            ImageReader::with_format(Cursor::new(&self.buffer[..]), format).into_dimensions()
        else {
            // Header not complete yet.
            return;
        };

        let (w, h) = events.size_prepared(width as i32, height as i32);
        let (w, h) = (w.max(1) as u32, h.max(1) as u32);
        debug!(width, height, w, h, "Image size prepared");

        let bitmap = Bitmap::new(w, h);
        self.bitmap = Some(bitmap.clone());
        events.area_prepared(&bitmap);
    }

    /// Sets up the row reader once everything up to the first image data
    /// chunk has arrived.
    fn start_png_stream(&mut self) -> Result<(), DecodeError> {
        let inbox = Inbox::default();
        let mut decoder =
            png::Decoder::new(StreamSource::new(self.buffer.clone(), inbox.clone()));
        decoder.set_transformations(png::Transformations::normalize_to_color8());
        let reader = match decoder.read_info() {
            Ok(reader) => reader,
            Err(e) if needs_more_input(&e) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let (color, depth) = reader.output_color_type();
        if reader.info().interlaced
            || depth != png::BitDepth::Eight
            || color == png::ColorType::Indexed
        {
            debug!(?color, ?depth, "PNG decoded on close");
            self.png = PngState::Buffered;
            return Ok(());
        }

        let (width, height) = reader.info().size();
        self.buffer = Vec::new();
        self.png = PngState::Streaming(Box::new(PngStream {
            reader,
            inbox,
            source: RgbaImage::new(width, height),
            rows: 0,
            painted: 0,
        }));
        Ok(())
    }
}

impl ProgressiveDecoder for RasterDecoder {
    fn write(&mut self, buf: &[u8], events: &mut dyn DecoderEvents) -> Result<(), DecodeError> {
        if self.closed {
            return Err(DecodeError::Truncated);
        }
        match &self.png {
            PngState::Streaming(stream) => stream.inbox.push(buf),
            _ => self.buffer.extend_from_slice(buf),
        }
        trace!(len = buf.len(), "Received image data");

        let format = match self.format {
            Some(format) => format,
            None => match Self::sniff(&self.buffer)? {
                Some(format) => {
                    self.format = Some(format);
                    format
                }
                None => return Ok(()),
            },
        };

        if self.bitmap.is_none() {
            self.prepare(format, events);
        }
        if format == ImageFormat::Png
            && self.bitmap.is_some()
            && matches!(self.png, PngState::Pending)
        {
            self.start_png_stream()?;
        }

        if let (PngState::Streaming(stream), Some(bitmap)) = (&mut self.png, self.bitmap.as_ref())
        {
            if stream.pull_rows()? > 0 {
                stream.paint(bitmap, events);
            }
        }
        Ok(())
    }

    fn close(&mut self, events: &mut dyn DecoderEvents) -> Result<(), DecodeError> {
        self.closed = true;
        let Some(format) = self.format else {
            return Err(if self.buffer.is_empty() {
                DecodeError::Truncated
            } else {
                DecodeError::UnsupportedFormat
            });
        };
        let Some(bitmap) = self.bitmap.clone() else {
            return Err(DecodeError::Truncated);
        };

        if let PngState::Streaming(stream) = &mut self.png {
            return stream.finish(&bitmap, events);
        }

        let decoded = image::load_from_memory_with_format(&self.buffer, format)?;
        let (w, h) = bitmap.dimensions();
        let rgba = if decoded.width() == w && decoded.height() == h {
            decoded.to_rgba8()
        } else {
            image::imageops::resize(&decoded.to_rgba8(), w, h, FilterType::Triangle)
        };
        *bitmap.write() = rgba;
        self.buffer = Vec::new();

        events.area_updated(Region::new(0, 0, w as i32, h as i32));
        Ok(())
    }

    fn abort(&mut self) {
        self.closed = true;
        self.buffer = Vec::new();
        self.png = PngState::Buffered;
        self.bitmap = None;
    }
}

/// Row-by-row PNG decoding state.
struct PngStream {
    reader: png::Reader<StreamSource>,
    inbox: Inbox,
    /// Decoded pixels at the natural size.
    source: RgbaImage,
    /// Rows of `source` decoded so far.
    rows: u32,
    /// Rows of the bitmap painted so far.
    painted: u32,
}

impl PngStream {
    /// Decodes every row the received bytes complete. Returns how many.
    fn pull_rows(&mut self) -> Result<u32, DecodeError> {
        let start = self.rows;
        while self.rows < self.source.height() {
            match self.reader.next_row() {
                Ok(Some(row)) => {
                    expand_row(row.data(), &mut self.source, self.rows);
                    self.rows += 1;
                }
                Ok(None) => break,
                Err(e) if needs_more_input(&e) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.rows - start)
    }

    /// Paints the bitmap rows whose nearest source row is decoded and
    /// reports them as one band.
    fn paint(&mut self, bitmap: &Bitmap, events: &mut dyn DecoderEvents) {
        let (src_w, src_h) = self.source.dimensions();
        let (w, h) = bitmap.dimensions();
        let ready = if self.rows >= src_h {
            h
        } else {
            ((self.rows as u64 * h as u64).div_ceil(src_h as u64) as u32).min(h)
        };
        if ready <= self.painted {
            return;
        }

        {
            let mut target = bitmap.write();
            for y in self.painted..ready {
                let sy = (y as u64 * src_h as u64 / h as u64) as u32;
                for x in 0..w {
                    let sx = (x as u64 * src_w as u64 / w as u64) as u32;
                    target.put_pixel(x, y, *self.source.get_pixel(sx, sy));
                }
            }
        }

        let band = Region::new(0, self.painted as i32, w as i32, (ready - self.painted) as i32);
        trace!(rows = self.rows, ?band, "Painted PNG rows");
        self.painted = ready;
        events.area_updated(band);
    }

    /// End of input. Fails unless every row arrived; resamples properly when
    /// the bitmap is scaled.
    fn finish(&mut self, bitmap: &Bitmap, events: &mut dyn DecoderEvents) -> Result<(), DecodeError> {
        self.pull_rows()?;
        if self.rows < self.source.height() {
            return Err(DecodeError::Truncated);
        }

        let (w, h) = bitmap.dimensions();
        if self.source.dimensions() == (w, h) {
            self.paint(bitmap, events);
        } else {
            *bitmap.write() = image::imageops::resize(&self.source, w, h, FilterType::Triangle);
            events.area_updated(Region::new(0, 0, w as i32, h as i32));
        }
        Ok(())
    }
}

/// Writes one 8-bit gray, gray+alpha, RGB or RGBA row into `image`.
fn expand_row(data: &[u8], image: &mut RgbaImage, y: u32) {
    let width = image.width() as usize;
    let channels = data.len() / width.max(1);
    if channels == 0 {
        return;
    }
    for (x, px) in data.chunks_exact(channels).take(width).enumerate() {
        let rgba = match *px {
            [g] => [g, g, g, 255],
            [g, a] => [g, g, g, a],
            [r, g, b] => [r, g, b, 255],
            [r, g, b, a] => [r, g, b, a],
            _ => continue,
        };
        image.put_pixel(x as u32, y, Rgba(rgba));
    }
}

fn needs_more_input(e: &png::DecodingError) -> bool {
    matches!(e, png::DecodingError::IoError(io) if io.kind() == io::ErrorKind::UnexpectedEof)
}

/// Bytes received after the row reader took over.
#[derive(Clone, Default)]
struct Inbox(Rc<RefCell<Vec<u8>>>);

impl Inbox {
    fn push(&self, buf: &[u8]) {
        self.0.borrow_mut().extend_from_slice(buf);
    }
}

/// Reader over everything received so far. Runs dry with an empty buffer,
/// which the png reader reports as `UnexpectedEof` and resumes from once more
/// bytes land in the inbox.
struct StreamSource {
    data: Vec<u8>,
    pos: usize,
    inbox: Inbox,
}

impl StreamSource {
    fn new(data: Vec<u8>, inbox: Inbox) -> Self {
        Self {
            data,
            pos: 0,
            inbox,
        }
    }
}

impl Read for StreamSource {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for StreamSource {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos == self.data.len() {
            self.data.append(&mut self.inbox.0.borrow_mut());
        }
        Ok(&self.data[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.data.len());
    }
}

impl Seek for StreamSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(n) => (self.data.len() as u64).checked_add_signed(n),
            SeekFrom::Current(n) => (self.pos as u64).checked_add_signed(n),
        };
        match target {
            Some(n) if n <= self.data.len() as u64 => {
                self.pos = n as usize;
                Ok(n)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek outside received data",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    #[derive(Default)]
    struct Recorder {
        sizes: Vec<(i32, i32)>,
        prepared: Vec<(u32, u32)>,
        updated: Vec<Region>,
        scale_to: Option<(i32, i32)>,
        bitmap: Option<Bitmap>,
    }

    impl Recorder {
        fn painted_rows(&self) -> i32 {
            self.updated.iter().map(|r| r.height).sum()
        }
    }

    impl DecoderEvents for Recorder {
        fn size_prepared(&mut self, width: i32, height: i32) -> (i32, i32) {
            self.sizes.push((width, height));
            self.scale_to.unwrap_or((width, height))
        }

        fn area_prepared(&mut self, bitmap: &Bitmap) {
            self.prepared.push(bitmap.dimensions());
            self.bitmap = Some(bitmap.clone());
        }

        fn area_updated(&mut self, region: Region) {
            self.updated.push(region);
        }
    }

    fn gradient(width: u32, height: u32) -> RgbaImage {
        ImageBuffer::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 200, 255]))
    }

    fn encode_png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        gradient(width, height)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    /// IEND: length, type and CRC.
    const PNG_TRAILER_LEN: usize = 12;

    #[test]
    fn test_streamed_png_paints_rows_before_close() {
        let png = encode_png(40, 30);
        let body = &png[..png.len() - PNG_TRAILER_LEN];
        let mut decoder = RasterDecoder::new();
        let mut events = Recorder::default();

        for chunk in body.chunks(7) {
            decoder.write(chunk, &mut events).unwrap();
        }
        assert_eq!(events.sizes, vec![(40, 30)]);
        assert_eq!(events.prepared, vec![(40, 30)]);
        assert!(!events.updated.is_empty());
        assert_eq!(events.painted_rows(), 30);

        let bitmap = events.bitmap.clone().unwrap();
        assert_eq!(bitmap.read().get_pixel(5, 7), &Rgba([5, 7, 200, 255]));
        assert_eq!(bitmap.read().get_pixel(39, 29), &Rgba([39, 29, 200, 255]));

        let before_close = events.updated.len();
        decoder.write(&png[png.len() - PNG_TRAILER_LEN..], &mut events).unwrap();
        decoder.close(&mut events).unwrap();
        assert_eq!(events.updated.len(), before_close);
    }

    #[test]
    fn test_bands_are_contiguous() {
        let png = encode_png(64, 64);
        let mut decoder = RasterDecoder::new();
        let mut events = Recorder::default();

        for chunk in png.chunks(16) {
            decoder.write(chunk, &mut events).unwrap();
        }
        decoder.close(&mut events).unwrap();

        let mut next = 0;
        for region in &events.updated {
            assert_eq!((region.x, region.y, region.width), (0, next, 64));
            next += region.height;
        }
        assert_eq!(next, 64);
    }

    #[test]
    fn test_rgb_png_is_opaque() {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(8, 4, |x, _| Rgb([x as u8 * 10, 0, 0]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        let mut decoder = RasterDecoder::new();
        let mut events = Recorder::default();

        decoder.write(out.get_ref(), &mut events).unwrap();
        decoder.close(&mut events).unwrap();
        let bitmap = events.bitmap.unwrap();
        assert_eq!(bitmap.read().get_pixel(3, 2), &Rgba([30, 0, 0, 255]));
    }

    #[test]
    fn test_negotiated_size_is_used() {
        let png = encode_png(100, 50);
        let mut decoder = RasterDecoder::new();
        let mut events = Recorder {
            scale_to: Some((20, 10)),
            ..Default::default()
        };

        decoder.write(&png, &mut events).unwrap();
        assert_eq!(events.prepared, vec![(20, 10)]);
        assert_eq!(events.painted_rows(), 10);

        decoder.close(&mut events).unwrap();
        assert_eq!(events.updated.last(), Some(&Region::new(0, 0, 20, 10)));
    }

    #[test]
    fn test_jpeg_is_painted_on_close() {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(16, 16, |x, y| Rgb([x as u8 * 8, y as u8 * 8, 90]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        let jpeg = out.into_inner();
        let mut decoder = RasterDecoder::new();
        let mut events = Recorder::default();

        for chunk in jpeg.chunks(64) {
            decoder.write(chunk, &mut events).unwrap();
        }
        assert_eq!(events.prepared, vec![(16, 16)]);
        assert!(events.updated.is_empty());

        decoder.close(&mut events).unwrap();
        assert_eq!(events.updated, vec![Region::new(0, 0, 16, 16)]);
    }

    #[test]
    fn test_rejects_non_image_early() {
        let mut decoder = RasterDecoder::new();
        let mut events = Recorder::default();
        let result = decoder.write(b"<!DOCTYPE html><html>", &mut events);
        assert!(matches!(result, Err(DecodeError::UnsupportedFormat)));
        assert!(events.sizes.is_empty());
    }

    #[test]
    fn test_short_prefix_waits_for_more() {
        let mut decoder = RasterDecoder::new();
        let mut events = Recorder::default();
        decoder.write(&PNG_SIGNATURE[..3], &mut events).unwrap();
        assert!(events.sizes.is_empty());
    }

    #[test]
    fn test_truncated_before_header_fails_on_close() {
        let png = encode_png(16, 16);
        let mut decoder = RasterDecoder::new();
        let mut events = Recorder::default();
        decoder.write(&png[..10], &mut events).unwrap();
        assert!(events.prepared.is_empty());
        assert!(matches!(
            decoder.close(&mut events),
            Err(DecodeError::Truncated)
        ));
    }

    #[test]
    fn test_truncated_body_fails_on_close() {
        let png = encode_png(64, 64);
        let mut decoder = RasterDecoder::new();
        let mut events = Recorder::default();
        decoder.write(&png[..png.len() / 2], &mut events).unwrap();
        assert_eq!(events.prepared.len(), 1);
        assert!(events.painted_rows() < 64);
        assert!(decoder.close(&mut events).is_err());
    }

    #[test]
    fn test_empty_input_fails_on_close() {
        let mut decoder = RasterDecoder::new();
        let mut events = Recorder::default();
        assert!(decoder.close(&mut events).is_err());
    }

    #[test]
    fn test_abort_discards_input() {
        let png = encode_png(32, 32);
        let mut decoder = RasterDecoder::new();
        let mut events = Recorder::default();
        decoder.write(&png[..png.len() / 2], &mut events).unwrap();
        let updates = events.updated.len();

        decoder.abort();
        assert!(decoder.write(&png[png.len() / 2..], &mut events).is_err());
        assert_eq!(events.updated.len(), updates);
    }
}
