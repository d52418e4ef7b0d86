//! # mixed-replace
//!
//! Incremental demultiplexer for `multipart/x-mixed-replace` streams, the
//! HTTP framing used by live camera feeds: an unbounded response body made
//! of `boundary / headers / blank line / payload` blocks where each payload
//! replaces the previously displayed one.
//!
//! The demuxer never buffers the whole response. Bytes are appended as they
//! arrive and complete payloads are emitted as [`Frame`]s in arrival order;
//! a boundary or header delimiter split across two network reads is still
//! found because partially scanned bytes are retained.

mod boundary;
mod demuxer;
mod error;
mod frame;
mod stream;

pub use boundary::{MIXED_REPLACE_MIME, boundary_from_content_type};
pub use demuxer::MultipartDemuxer;
pub use error::StreamError;
pub use frame::Frame;
pub use stream::FrameDecoderStream;
