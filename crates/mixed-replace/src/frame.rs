use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;

/// One payload unit extracted from a replacement stream.
///
/// The payload is an opaque byte blob; no decoding or validation of the
/// image contents is performed. The sequence number records arrival order
/// within one stream; the wire carries no timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u64,
    pub payload: Bytes,
}

impl Frame {
    pub(crate) fn new(sequence: u64, payload: Bytes) -> Self {
        Self { sequence, payload }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Zero-length frames occur when two boundaries are adjacent; consumers
    /// may skip them, they are not an error.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Encode the payload into a `data:` URI suitable for an image renderer.
    pub fn data_uri(&self, mime: &str) -> String {
        format!("data:{mime};base64,{}", BASE64.encode(&self.payload))
    }
}
