use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};
use memchr::memmem;

use crate::errors::Error;
use crate::multipart::part::PartHeaders;

/// Upper bound on one part's header block. A block that grows past this
/// without terminating is treated as a framing error.
const MAX_HEADER_BLOCK: usize = 8 * 1024;

/// One scanner observation. Data is released eagerly: a part's payload
/// arrives as a sequence of `Data` events terminated by `PartEnd`.
#[derive(Debug)]
pub(crate) enum ScanEvent {
    /// More input is required before the next event can be produced.
    NeedMoreData,
    /// A new part's headers were parsed; its payload follows.
    PartStart(PartHeaders),
    /// A slice of the current part's payload.
    Data(Bytes),
    /// The current part's payload is complete.
    PartEnd,
    /// The closing delimiter was consumed; no more parts. Terminal.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ScanState {
    /// Discarding everything before the first boundary.
    Preamble,
    /// Just consumed a delimiter; deciding between next part and close.
    AfterDelimiter,
    /// Accumulating the current part's header block.
    Headers,
    /// Streaming the current part's payload.
    Body,
    /// Closing delimiter seen; remaining input is epilogue and is dropped.
    Done,
}

/// Incremental multipart framing scanner.
///
/// Sans-IO: callers [`feed`](Self::feed) raw body chunks and drain events
/// with [`next_event`](Self::next_event). The scanner holds a bounded
/// buffer - payload bytes are released as soon as they cannot be part of a
/// delimiter, so memory stays on the order of one fed chunk plus the
/// delimiter length regardless of part size. Delimiters that span chunk
/// boundaries are found; nothing here assumes line-oriented input.
#[derive(Debug)]
pub(crate) struct BoundaryScanner {
    /// `\r\n--{boundary}`. The leading CRLF is considered part of the
    /// delimiter; the buffer is seeded with a virtual CRLF so a body that
    /// opens directly with `--{boundary}` matches the same search.
    delimiter: Vec<u8>,
    buffer: BytesMut,
    pending: VecDeque<ScanEvent>,
    state: ScanState,
    eof: bool,
}

impl BoundaryScanner {
    pub(crate) fn with_capacity(boundary: &str, capacity: usize) -> Self {
        let delimiter = format!("\r\n--{boundary}").into_bytes();
        let mut buffer = BytesMut::with_capacity(capacity);
        buffer.extend_from_slice(b"\r\n");

        Self {
            delimiter,
            buffer,
            pending: VecDeque::new(),
            state: ScanState::Preamble,
            eof: false,
        }
    }

    /// Append a raw body chunk to the scan buffer.
    pub(crate) fn feed(&mut self, chunk: &[u8]) {
        if self.state == ScanState::Done {
            // Epilogue is ignored per RFC 2046.
            return;
        }
        self.buffer.extend_from_slice(chunk);
    }

    /// Signal that the body stream has ended. After this, the scanner either
    /// drains to `Finished` or reports a framing error; it never asks for
    /// more data again.
    pub(crate) fn set_eof(&mut self) {
        self.eof = true;
    }

    pub(crate) fn next_event(&mut self) -> Result<ScanEvent, Error> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }

        loop {
            match self.state {
                ScanState::Preamble => match memmem::find(&self.buffer, &self.delimiter) {
                    Some(i) => {
                        self.buffer.advance(i + self.delimiter.len());
                        self.state = ScanState::AfterDelimiter;
                    }
                    None => {
                        if self.eof {
                            return Err(Error::malformed("stream ended before the first boundary"));
                        }
                        self.retain_delimiter_tail();
                        return Ok(ScanEvent::NeedMoreData);
                    }
                },

                ScanState::AfterDelimiter => {
                    // Skip transport padding between the delimiter and CRLF.
                    while self.buffer.first().is_some_and(|b| *b == b' ' || *b == b'\t') {
                        self.buffer.advance(1);
                    }
                    if self.buffer.len() < 2 {
                        if self.eof {
                            return Err(Error::malformed("stream ended directly after a boundary"));
                        }
                        return Ok(ScanEvent::NeedMoreData);
                    }
                    match &self.buffer[..2] {
                        b"\r\n" => {
                            self.buffer.advance(2);
                            self.state = ScanState::Headers;
                        }
                        b"--" => {
                            self.buffer.advance(2);
                            self.state = ScanState::Done;
                        }
                        other => {
                            return Err(Error::malformed(format!(
                                "boundary must be followed by CRLF or `--`, found {other:?}"
                            )));
                        }
                    }
                }

                ScanState::Headers => {
                    // A part with no headers starts its payload immediately
                    // after a lone CRLF.
                    if self.buffer.starts_with(b"\r\n") {
                        self.buffer.advance(2);
                        self.state = ScanState::Body;
                        return Ok(ScanEvent::PartStart(PartHeaders::default()));
                    }
                    match memmem::find(&self.buffer, b"\r\n\r\n") {
                        Some(i) => {
                            let block = self.buffer.split_to(i);
                            self.buffer.advance(4);
                            self.state = ScanState::Body;
                            return Ok(ScanEvent::PartStart(PartHeaders::parse(&block)?));
                        }
                        None => {
                            if self.buffer.len() > MAX_HEADER_BLOCK {
                                return Err(Error::malformed("part header block too large"));
                            }
                            if self.eof {
                                return Err(Error::malformed("stream ended inside part headers"));
                            }
                            return Ok(ScanEvent::NeedMoreData);
                        }
                    }
                }

                ScanState::Body => match memmem::find(&self.buffer, &self.delimiter) {
                    Some(i) => {
                        let data = self.buffer.split_to(i).freeze();
                        self.buffer.advance(self.delimiter.len());
                        self.state = ScanState::AfterDelimiter;
                        if !data.is_empty() {
                            self.pending.push_back(ScanEvent::PartEnd);
                            return Ok(ScanEvent::Data(data));
                        }
                        return Ok(ScanEvent::PartEnd);
                    }
                    None => {
                        // Everything except a possible delimiter prefix at the
                        // buffer tail is definitely payload.
                        let safe = self.buffer.len().saturating_sub(self.delimiter.len() - 1);
                        if safe > 0 {
                            return Ok(ScanEvent::Data(self.buffer.split_to(safe).freeze()));
                        }
                        if self.eof {
                            return Err(Error::malformed("stream ended inside part body"));
                        }
                        return Ok(ScanEvent::NeedMoreData);
                    }
                },

                ScanState::Done => {
                    self.buffer.clear();
                    return Ok(ScanEvent::Finished);
                }
            }
        }
    }

    /// In the preamble, only a delimiter prefix at the tail can still become
    /// a match; everything before it is discardable.
    fn retain_delimiter_tail(&mut self) {
        let keep = self.delimiter.len() - 1;
        if self.buffer.len() > keep {
            let discard = self.buffer.len() - keep;
            self.buffer.advance(discard);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feeds `data` to a scanner in `chunk_size` slices and collects parts as
    /// (headers, payload) pairs.
    fn scan(boundary: &str, data: &[u8], chunk_size: usize) -> Result<Vec<(PartHeaders, Vec<u8>)>, Error> {
        let mut scanner = BoundaryScanner::with_capacity(boundary, 256);
        let mut chunks = data.chunks(chunk_size);
        let mut parts: Vec<(PartHeaders, Vec<u8>)> = Vec::new();
        let mut current: Option<(PartHeaders, Vec<u8>)> = None;

        loop {
            match scanner.next_event()? {
                ScanEvent::NeedMoreData => match chunks.next() {
                    Some(chunk) => scanner.feed(chunk),
                    None => scanner.set_eof(),
                },
                ScanEvent::PartStart(headers) => {
                    assert!(current.is_none(), "part started while previous still open");
                    current = Some((headers, Vec::new()));
                }
                ScanEvent::Data(bytes) => {
                    current.as_mut().expect("data outside a part").1.extend_from_slice(&bytes);
                }
                ScanEvent::PartEnd => {
                    parts.push(current.take().expect("part end without start"));
                }
                ScanEvent::Finished => return Ok(parts),
            }
        }
    }

    const SIMPLE: &[u8] = b"--simple boundary\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
\r\n\
Part1\r\n\
--simple boundary\r\n\
Content-Type: text/plain; charset=us-ascii\r\n\
\r\n\
Part2\r\n\r\n\
--simple boundary--\r\n";

    #[test]
    fn parses_two_parts() {
        let parts = scan("simple boundary", SIMPLE, SIMPLE.len()).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].0.name, "file");
        assert_eq!(parts[0].0.file_name, "a.txt");
        assert_eq!(parts[0].1, b"Part1");
        assert_eq!(parts[1].0.content_type.as_deref(), Some("text/plain; charset=us-ascii"));
        assert_eq!(parts[1].1, b"Part2\r\n");
    }

    #[test]
    fn delimiter_spanning_chunk_boundaries() {
        // Every chunk size slices the delimiter differently; the result must
        // not depend on where the network happened to split the stream.
        for chunk_size in [1, 2, 3, 7, 16, 61] {
            let parts = scan("simple boundary", SIMPLE, chunk_size).unwrap();
            assert_eq!(parts.len(), 2, "chunk_size={chunk_size}");
            assert_eq!(parts[0].1, b"Part1", "chunk_size={chunk_size}");
            assert_eq!(parts[1].1, b"Part2\r\n", "chunk_size={chunk_size}");
        }
    }

    #[test]
    fn ignores_preamble_and_epilogue() {
        let data = b"This is the preamble. It is to be ignored.\r\n\
--b\r\n\r\nhello\r\n--b--\r\nThis is the epilogue. Also ignored.\r\n";
        let parts = scan("b", data, 5).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].1, b"hello");
    }

    #[test]
    fn payload_containing_near_boundary_text() {
        // A payload that contains the boundary text minus the final byte
        // must come through intact.
        let data = b"--xyz\r\n\r\nbody with \r\n--xy teaser inside\r\n--xyz--\r\n";
        let parts = scan("xyz", data, 4).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].1, b"body with \r\n--xy teaser inside");
    }

    #[test]
    fn empty_part_payload() {
        let data = b"--b\r\nContent-Disposition: form-data; name=\"empty\"\r\n\r\n\r\n--b--\r\n";
        let parts = scan("b", data, 8).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].0.name, "empty");
        assert!(parts[0].1.is_empty());
    }

    #[test]
    fn immediate_close_yields_no_parts() {
        let parts = scan("b", b"--b--\r\n", 3).unwrap();
        assert!(parts.is_empty());
    }

    #[test]
    fn missing_close_delimiter_is_malformed() {
        let data = b"--b\r\n\r\ntruncated payload without a clos";
        let err = scan("b", data, 6).unwrap_err();
        assert!(matches!(err, Error::MalformedStream { .. }));
    }

    #[test]
    fn stream_without_any_boundary_is_malformed() {
        let err = scan("b", b"not multipart at all", 4).unwrap_err();
        assert!(matches!(err, Error::MalformedStream { .. }));
    }

    #[test]
    fn garbage_after_boundary_is_malformed() {
        let err = scan("b", b"--bXX\r\n\r\ndata\r\n--b--", 64).unwrap_err();
        assert!(matches!(err, Error::MalformedStream { .. }));
    }

    #[test]
    fn transport_padding_after_boundary() {
        let data = b"--b  \t\r\n\r\npadded\r\n--b  --\r\n";
        let parts = scan("b", data, 9).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].1, b"padded");
    }

    #[test]
    fn oversized_header_block_is_malformed() {
        let mut data = b"--b\r\nX-Filler: ".to_vec();
        data.extend(std::iter::repeat_n(b'a', MAX_HEADER_BLOCK + 1));
        let err = scan("b", &data, 512).unwrap_err();
        assert!(matches!(err, Error::MalformedStream { .. }));
    }
}
