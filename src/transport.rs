//! Blocking network transfers with a streaming write sink.

use std::io::Read;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, trace, warn};

use crate::error::TransportError;

/// Size of the read buffer handed to the sink per chunk.
const CHUNK_SIZE: usize = 16 * 1024;

/// A GET request with custom headers.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Receives each chunk of the body. Returning fewer bytes than it was given
/// aborts the transfer.
pub type WriteSink<'a> = dyn FnMut(&[u8]) -> usize + 'a;

pub trait Transport: Send + Sync + 'static {
    /// Performs `request`, blocking until the body is fully streamed into
    /// `sink`, the sink aborts, or the transfer fails.
    fn fetch(&self, request: &FetchRequest, sink: &mut WriteSink<'_>)
        -> Result<(), TransportError>;
}

/// Feeds `reader` into `sink` in `CHUNK_SIZE` pieces.
pub fn pump<R: Read>(mut reader: R, sink: &mut WriteSink<'_>) -> Result<u64, TransportError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(total);
        }
        let accepted = sink(&buf[..n]);
        if accepted < n {
            trace!(accepted, offered = n, "Write sink aborted transfer");
            return Err(TransportError::Aborted);
        }
        total += n as u64;
    }
}

/// `reqwest::blocking` backed transport.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }

    fn header_map(request: &FetchRequest) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in &request.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    map.append(name, value);
                }
                _ => warn!(header = %name, "Skipping malformed request header"),
            }
        }
        map
    }
}

impl Transport for HttpTransport {
    fn fetch(
        &self,
        request: &FetchRequest,
        sink: &mut WriteSink<'_>,
    ) -> Result<(), TransportError> {
        debug!(url = %request.url, "Starting preview transfer");

        let response = self
            .client
            .get(&request.url)
            .headers(Self::header_map(request))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let total = pump(response, sink)?;
        debug!(url = %request.url, bytes = total, "Preview transfer finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_pump_delivers_all_bytes_in_order() {
        let data: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
        let mut received = Vec::new();
        let mut calls = 0;
        let total = pump(Cursor::new(data.clone()), &mut |chunk: &[u8]| {
            calls += 1;
            received.extend_from_slice(chunk);
            chunk.len()
        })
        .unwrap();

        assert_eq!(total, data.len() as u64);
        assert_eq!(received, data);
        assert!(calls >= 3);
    }

    #[test]
    fn test_short_write_aborts() {
        let data = vec![7u8; CHUNK_SIZE * 3];
        let mut calls = 0;
        let result = pump(Cursor::new(data), &mut |_chunk: &[u8]| {
            calls += 1;
            0
        });
        assert!(matches!(result, Err(TransportError::Aborted)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let req = FetchRequest::get("http://example.com/a.png").with_header("User-Agent", "ua");
        assert_eq!(req.header("user-agent"), Some("ua"));
        assert_eq!(req.header("accept"), None);
    }

    #[test]
    fn test_header_map_skips_malformed() {
        let req = FetchRequest::get("http://example.com/a.png")
            .with_header("User-Agent", "ua")
            .with_header("bad header", "x");
        let map = HttpTransport::header_map(&req);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("user-agent").unwrap(), "ua");
    }
}
