use bytes::{Buf, Bytes, BytesMut};
use memchr::memmem;
use tracing::{debug, trace};

use crate::boundary::boundary_from_content_type;
use crate::error::StreamError;
use crate::frame::Frame;

/// Header/body delimiter inside one part.
const HEADER_DELIMITER: &[u8] = b"\r\n\r\n";

/// Where scanning left off, so appended bytes never force a rescan of the
/// whole buffer and a marker straddling two reads is still found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Looking for `CRLF + boundary` that opens a part.
    SeekBoundary { from: usize },
    /// Boundary found; looking for the `CRLF CRLF` ending the part headers.
    SeekHeaderEnd { from: usize },
    /// Headers ended; looking for the next `CRLF + boundary` that closes
    /// the payload starting at `payload_start`.
    SeekNextBoundary { payload_start: usize, from: usize },
}

/// Incremental demultiplexer for one `multipart/x-mixed-replace` body.
///
/// Feed transport chunks with [`push`](Self::push) and drain complete
/// payloads with [`next_frame`](Self::next_frame). Unconsumed bytes are kept
/// in a single growing buffer; bytes are only dropped once the frame they
/// belong to has been emitted. A trailing partial frame at stream end is
/// incomplete data, not an error, and is silently discarded by dropping the
/// demuxer.
#[derive(Debug)]
pub struct MultipartDemuxer {
    /// `\r\n--<token>`, derived once from the declared content type.
    delimiter: Vec<u8>,
    buffer: BytesMut,
    state: ScanState,
    next_sequence: u64,
}

impl MultipartDemuxer {
    /// Build a demuxer from the stream's declared `Content-Type` value.
    pub fn from_content_type(content_type: &str) -> Result<Self, StreamError> {
        let token = boundary_from_content_type(content_type)?;
        Ok(Self::with_boundary(&token))
    }

    /// Build a demuxer for a known boundary token.
    pub fn with_boundary(token: &str) -> Self {
        let mut delimiter = Vec::with_capacity(4 + token.len());
        delimiter.extend_from_slice(b"\r\n--");
        delimiter.extend_from_slice(token.as_bytes());

        Self {
            delimiter,
            buffer: BytesMut::new(),
            state: ScanState::SeekBoundary { from: 0 },
            next_sequence: 0,
        }
    }

    /// Append one transport chunk. Never discards partially scanned data.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        trace!(
            chunk_len = chunk.len(),
            buffered = self.buffer.len(),
            "appended stream chunk"
        );
    }

    /// Bytes buffered but not yet emitted as a frame.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Scan the buffer for the next complete frame.
    ///
    /// Returns `None` when one of the three markers is not yet present; the
    /// scan resumes where it stopped once more bytes are pushed. Emitted
    /// frames preserve arrival order and payload bytes are never duplicated
    /// or dropped across read boundaries.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.state {
                ScanState::SeekBoundary { from } => {
                    match memmem::find(&self.buffer[from..], &self.delimiter) {
                        Some(offset) => {
                            self.state = ScanState::SeekHeaderEnd {
                                from: from + offset + self.delimiter.len(),
                            };
                        }
                        None => {
                            self.state = ScanState::SeekBoundary {
                                from: self.resume_point(from, self.delimiter.len()),
                            };
                            return None;
                        }
                    }
                }
                ScanState::SeekHeaderEnd { from } => {
                    match memmem::find(&self.buffer[from..], HEADER_DELIMITER) {
                        Some(offset) => {
                            self.state = ScanState::SeekNextBoundary {
                                payload_start: from + offset + HEADER_DELIMITER.len(),
                                from: from + offset + HEADER_DELIMITER.len(),
                            };
                        }
                        None => {
                            self.state = ScanState::SeekHeaderEnd {
                                from: self.resume_point(from, HEADER_DELIMITER.len()),
                            };
                            return None;
                        }
                    }
                }
                ScanState::SeekNextBoundary {
                    payload_start,
                    from,
                } => {
                    match memmem::find(&self.buffer[from..], &self.delimiter) {
                        Some(offset) => {
                            let next_boundary = from + offset;
                            let payload = Bytes::copy_from_slice(
                                &self.buffer[payload_start..next_boundary],
                            );

                            // Drop everything up to, but not including, the
                            // next boundary and rescan from the buffer start.
                            self.buffer.advance(next_boundary);
                            self.state = ScanState::SeekBoundary { from: 0 };

                            let frame = Frame::new(self.next_sequence, payload);
                            self.next_sequence += 1;
                            debug!(
                                sequence = frame.sequence,
                                len = frame.len(),
                                "demuxed frame"
                            );
                            return Some(frame);
                        }
                        None => {
                            self.state = ScanState::SeekNextBoundary {
                                payload_start,
                                from: self
                                    .resume_point(from, self.delimiter.len())
                                    .max(payload_start),
                            };
                            return None;
                        }
                    }
                }
            }
        }
    }

    /// Furthest position a failed search may resume from without missing a
    /// marker whose prefix is already buffered.
    fn resume_point(&self, floor: usize, marker_len: usize) -> usize {
        self.buffer
            .len()
            .saturating_sub(marker_len - 1)
            .max(floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demux_chunks(chunks: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut demuxer = MultipartDemuxer::with_boundary("X");
        let mut frames = Vec::new();
        for chunk in chunks {
            demuxer.push(chunk);
            while let Some(frame) = demuxer.next_frame() {
                frames.push(frame.payload.to_vec());
            }
        }
        frames
    }

    #[test]
    fn three_chunk_stream_yields_two_frames() {
        let frames = demux_chunks(&[
            b"\r\n--X\r\nA:1\r\n\r\n",
            b"DEADBEEF\r\n--X\r\n",
            b"B:2\r\n\r\nCAFEBABE\r\n--X--",
        ]);
        assert_eq!(frames, vec![b"DEADBEEF".to_vec(), b"CAFEBABE".to_vec()]);
    }

    #[test]
    fn single_delivery_matches_chunked_delivery() {
        let stream: &[u8] = b"\r\n--X\r\nA:1\r\n\r\nDEADBEEF\r\n--X\r\nB:2\r\n\r\nCAFEBABE\r\n--X--";
        let whole = demux_chunks(&[stream]);
        let byte_at_a_time: Vec<&[u8]> = stream.chunks(1).collect();
        assert_eq!(whole, demux_chunks(&byte_at_a_time));
        assert_eq!(whole, vec![b"DEADBEEF".to_vec(), b"CAFEBABE".to_vec()]);
    }

    #[test]
    fn marker_split_across_reads_is_found() {
        // Boundary and header delimiter each straddle a chunk edge.
        let frames = demux_chunks(&[
            b"\r\n--",
            b"X\r\nContent-Type: image/jpeg\r\n",
            b"\r\npayload-one\r",
            b"\n--X\r\n\r\n\r\npayload-two\r\n--X",
        ]);
        // Second part's headers are empty: `\r\n\r\n` right after the
        // boundary line's CRLF terminator.
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], b"payload-one");
        assert_eq!(frames[1], b"\r\npayload-two");
    }

    #[test]
    fn empty_payload_is_a_zero_length_frame() {
        let frames = demux_chunks(&[b"\r\n--X\r\nA:1\r\n\r\n\r\n--X\r\nB:2\r\n\r\nend\r\n--X"]);
        assert_eq!(frames, vec![b"".to_vec(), b"end".to_vec()]);
    }

    #[test]
    fn trailing_partial_frame_is_not_emitted() {
        let mut demuxer = MultipartDemuxer::with_boundary("X");
        demuxer.push(b"\r\n--X\r\nA:1\r\n\r\ntruncated");
        assert!(demuxer.next_frame().is_none());
        assert!(demuxer.pending_len() > 0);
    }

    #[test]
    fn sequence_numbers_follow_arrival_order() {
        let mut demuxer = MultipartDemuxer::with_boundary("X");
        demuxer.push(b"\r\n--X\r\n\r\n\r\na\r\n--X\r\n\r\n\r\nb\r\n--X");
        let first = demuxer.next_frame().unwrap();
        let second = demuxer.next_frame().unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert!(demuxer.next_frame().is_none());
    }

    #[test]
    fn from_content_type_rejects_malformed_declarations() {
        assert!(MultipartDemuxer::from_content_type("multipart/x-mixed-replace").is_err());
        assert!(MultipartDemuxer::from_content_type("video/mp4; boundary=X").is_err());
        assert!(
            MultipartDemuxer::from_content_type("multipart/x-mixed-replace; boundary=frame")
                .is_ok()
        );
    }
}
