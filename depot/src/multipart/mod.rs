//! Streaming multipart body parsing.
//!
//! Produces a lazy, forward-only sequence of parts from a raw body stream
//! and the boundary declared in the request's `Content-Type`. The underlying
//! stream is consumed incrementally in bounded chunks; a part's payload is
//! handed out as it arrives rather than being buffered whole, so memory use
//! is independent of upload size.
//!
//! At most one part is active at a time: requesting the next part drains any
//! unread remainder of the current one, which keeps boundary framing intact
//! when a consumer abandons a part midway (e.g. after rejecting it).
//!
//! Framing follows RFC 2046: the delimiter is the boundary preceded by CRLF,
//! a trailing `--` marks the close, and preamble/epilogue are discarded.

mod parser;
mod part;

pub use part::PartHeaders;

use axum::http::{HeaderMap, header};
use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::errors::Error;
use crate::multipart::parser::{BoundaryScanner, ScanEvent};

/// Streaming multipart parser over a fallible byte-chunk stream.
pub struct Multipart<S> {
    scanner: BoundaryScanner,
    stream: S,
    part_active: bool,
    finished: bool,
}

impl<S> std::fmt::Debug for Multipart<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multipart")
            .field("part_active", &self.part_active)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<S> Multipart<S>
where
    S: Stream<Item = Result<Bytes, axum::Error>> + Unpin,
{
    /// Validate the request headers and construct a parser.
    ///
    /// Fails with [`Error::InvalidContentType`] before any body byte is read
    /// when the Content-Type is missing, is not `multipart/form-data` or
    /// `multipart/mixed`, or lacks a `boundary` parameter.
    pub fn new(headers: &HeaderMap, stream: S, buffer_capacity: usize) -> Result<Self, Error> {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .ok_or_else(|| Error::invalid_content_type("Content-Type header missing"))?;

        let mime_type = content_type
            .to_str()
            .map_err(|e| Error::invalid_content_type(format!("Content-Type is not visible ASCII: {e}")))?
            .parse::<mime::Mime>()
            .map_err(|e| Error::invalid_content_type(format!("Content-Type is not a valid MIME type: {e}")))?;

        if mime_type.type_() != mime::MULTIPART || !matches!(mime_type.subtype().as_str(), "form-data" | "mixed") {
            return Err(Error::invalid_content_type(format!(
                "expected multipart/form-data or multipart/mixed, got {}",
                mime_type.essence_str()
            )));
        }

        let boundary = mime_type
            .get_param(mime::BOUNDARY)
            .ok_or_else(|| Error::invalid_content_type("boundary parameter missing"))?;

        Ok(Self {
            scanner: BoundaryScanner::with_capacity(boundary.as_str(), buffer_capacity),
            stream,
            part_active: false,
            finished: false,
        })
    }

    /// Advance to the next part.
    ///
    /// Any unread payload of the previously returned part is drained first,
    /// so the returned part always starts exactly at its own payload. `None`
    /// means the closing delimiter was consumed; that is the normal end of
    /// the sequence, not an error.
    pub async fn next_part(&mut self) -> Result<Option<Part<'_, S>>, Error> {
        while self.part_active {
            self.pull_part_data().await?;
        }

        if self.finished {
            return Ok(None);
        }

        loop {
            match self.scanner.next_event()? {
                ScanEvent::PartStart(headers) => {
                    self.part_active = true;
                    return Ok(Some(Part { multipart: self, headers }));
                }
                ScanEvent::Finished => {
                    self.finished = true;
                    return Ok(None);
                }
                ScanEvent::NeedMoreData => self.fill().await?,
                ScanEvent::Data(_) | ScanEvent::PartEnd => {
                    return Err(Error::Internal {
                        operation: "advance multipart scanner between parts".to_string(),
                    });
                }
            }
        }
    }

    /// Next payload chunk of the active part; `None` at part end.
    async fn pull_part_data(&mut self) -> Result<Option<Bytes>, Error> {
        loop {
            match self.scanner.next_event()? {
                ScanEvent::Data(bytes) => return Ok(Some(bytes)),
                ScanEvent::PartEnd => {
                    self.part_active = false;
                    return Ok(None);
                }
                ScanEvent::NeedMoreData => self.fill().await?,
                ScanEvent::PartStart(_) | ScanEvent::Finished => {
                    return Err(Error::Internal {
                        operation: "advance multipart scanner within a part".to_string(),
                    });
                }
            }
        }
    }

    /// Pull one chunk from the body stream into the scanner. A stream error
    /// here is a transport failure and aborts the whole request.
    async fn fill(&mut self) -> Result<(), Error> {
        match self.stream.next().await {
            Some(Ok(chunk)) => {
                self.scanner.feed(&chunk);
                Ok(())
            }
            Some(Err(e)) => Err(Error::TransportRead { message: e.to_string() }),
            None => {
                self.scanner.set_eof();
                Ok(())
            }
        }
    }
}

/// One part of a multipart body: parsed metadata plus a forward-only payload
/// stream.
///
/// The payload is valid only while this part is held; dropping it and asking
/// the parent [`Multipart`] for the next part discards whatever was unread.
pub struct Part<'m, S> {
    multipart: &'m mut Multipart<S>,
    headers: PartHeaders,
}

impl<S> Part<'_, S>
where
    S: Stream<Item = Result<Bytes, axum::Error>> + Unpin,
{
    /// Form field name.
    pub fn name(&self) -> &str {
        &self.headers.name
    }

    /// Original file name; empty for non-file fields.
    pub fn file_name(&self) -> &str {
        &self.headers.file_name
    }

    /// Client-declared Content-Type. Informational only - never use this
    /// for accept/reject decisions.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.content_type.as_deref()
    }

    /// Declared per-part Content-Length, when the transport provided one.
    pub fn content_length(&self) -> Option<u64> {
        self.headers.content_length
    }

    /// Next payload chunk, or `None` once this part's payload is complete.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, Error> {
        if !self.multipart.part_active {
            return Ok(None);
        }
        self.multipart.pull_part_data().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn multipart_headers(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers
    }

    /// Body stream delivering `data` in `chunk_size` slices.
    fn body_stream(data: &[u8], chunk_size: usize) -> impl Stream<Item = Result<Bytes, axum::Error>> + Unpin {
        let chunks: Vec<Result<Bytes, axum::Error>> = data.chunks(chunk_size).map(|c| Ok(Bytes::copy_from_slice(c))).collect();
        futures::stream::iter(chunks)
    }

    const TWO_PARTS: &[u8] = b"--B\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
\r\n\
first payload\r\n\
--B\r\n\
Content-Disposition: form-data; name=\"notes\"\r\n\
\r\n\
second payload\r\n\
--B--\r\n";

    async fn read_all<S>(part: &mut Part<'_, S>) -> Vec<u8>
    where
        S: Stream<Item = Result<Bytes, axum::Error>> + Unpin,
    {
        let mut out = Vec::new();
        while let Some(chunk) = part.chunk().await.unwrap() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    /// Reads until part end, returning the error that stopped it, if any.
    async fn read_to_err<S>(part: &mut Part<'_, S>) -> Option<Error>
    where
        S: Stream<Item = Result<Bytes, axum::Error>> + Unpin,
    {
        loop {
            match part.chunk().await {
                Ok(Some(_)) => continue,
                Ok(None) => return None,
                Err(e) => return Some(e),
            }
        }
    }

    #[tokio::test]
    async fn yields_parts_in_stream_order() {
        let stream = body_stream(TWO_PARTS, 11);
        let mut multipart = Multipart::new(&multipart_headers("multipart/form-data; boundary=B"), stream, 256).unwrap();

        let mut part = multipart.next_part().await.unwrap().expect("first part");
        assert_eq!(part.name(), "file");
        assert_eq!(part.file_name(), "a.txt");
        assert_eq!(read_all(&mut part).await, b"first payload");

        let mut part = multipart.next_part().await.unwrap().expect("second part");
        assert_eq!(part.name(), "notes");
        assert_eq!(part.file_name(), "");
        assert_eq!(read_all(&mut part).await, b"second payload");

        assert!(multipart.next_part().await.unwrap().is_none());
        // Terminal: repeated calls keep returning None.
        assert!(multipart.next_part().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn skipping_a_part_preserves_the_next_one() {
        let stream = body_stream(TWO_PARTS, 7);
        let mut multipart = Multipart::new(&multipart_headers("multipart/form-data; boundary=B"), stream, 256).unwrap();

        // Take the first part but read none of its payload.
        let part = multipart.next_part().await.unwrap().expect("first part");
        assert_eq!(part.name(), "file");
        drop(part);

        // The unread payload is drained; the second part arrives intact.
        let mut part = multipart.next_part().await.unwrap().expect("second part");
        assert_eq!(part.name(), "notes");
        assert_eq!(read_all(&mut part).await, b"second payload");
    }

    #[tokio::test]
    async fn multipart_mixed_is_accepted() {
        let stream = body_stream(b"--B\r\n\r\npayload\r\n--B--\r\n", 64);
        let mut multipart = Multipart::new(&multipart_headers("multipart/mixed; boundary=B"), stream, 256).unwrap();
        let mut part = multipart.next_part().await.unwrap().expect("part");
        assert_eq!(read_all(&mut part).await, b"payload");
    }

    #[test]
    fn rejects_missing_content_type() {
        let stream = body_stream(b"", 1);
        let err = Multipart::new(&HeaderMap::new(), stream, 256).unwrap_err();
        assert!(matches!(err, Error::InvalidContentType { .. }));
    }

    #[test]
    fn rejects_non_multipart_content_type() {
        let stream = body_stream(b"{}", 2);
        let err = Multipart::new(&multipart_headers("application/json"), stream, 256).unwrap_err();
        assert!(matches!(err, Error::InvalidContentType { .. }));
    }

    #[test]
    fn rejects_multipart_without_boundary() {
        let stream = body_stream(b"", 1);
        let err = Multipart::new(&multipart_headers("multipart/form-data"), stream, 256).unwrap_err();
        assert!(matches!(err, Error::InvalidContentType { .. }));
    }

    #[tokio::test]
    async fn transport_error_surfaces_as_transport_read() {
        let chunks: Vec<Result<Bytes, axum::Error>> = vec![
            Ok(Bytes::from_static(b"--B\r\n\r\nbegin")),
            Err(axum::Error::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "client went away",
            ))),
        ];
        let stream = futures::stream::iter(chunks);
        let mut multipart = Multipart::new(&multipart_headers("multipart/form-data; boundary=B"), stream, 256).unwrap();

        let mut part = multipart.next_part().await.unwrap().expect("part");
        let err = read_to_err(&mut part).await;
        assert!(matches!(err, Some(Error::TransportRead { .. })));
    }

    #[tokio::test]
    async fn truncated_body_is_malformed() {
        let stream = body_stream(b"--B\r\n\r\nnever closed", 5);
        let mut multipart = Multipart::new(&multipart_headers("multipart/form-data; boundary=B"), stream, 256).unwrap();

        let mut part = multipart.next_part().await.unwrap().expect("part");
        let err = read_to_err(&mut part).await;
        assert!(matches!(err, Some(Error::MalformedStream { .. })));
    }
}
