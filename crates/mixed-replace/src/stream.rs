use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tracing::debug;

use crate::demuxer::MultipartDemuxer;
use crate::error::StreamError;
use crate::frame::Frame;

/// Adapter that turns a chunked byte stream into a stream of [`Frame`]s.
///
/// Each poll drains frames already buffered in the demuxer before reading
/// further from the transport, so a consumer never lags behind data it has
/// already received. When the transport ends, a trailing partial frame is
/// discarded silently and the stream terminates; a transport that ends
/// without ever delivering a byte yields [`StreamError::EmptyBody`] first.
pub struct FrameDecoderStream<S> {
    inner: S,
    demuxer: MultipartDemuxer,
    received_any: bool,
    done: bool,
}

impl<S> FrameDecoderStream<S>
where
    S: Stream<Item = Result<Bytes, StreamError>> + Unpin,
{
    pub fn new(inner: S, demuxer: MultipartDemuxer) -> Self {
        Self {
            inner,
            demuxer,
            received_any: false,
            done: false,
        }
    }
}

impl<S> Stream for FrameDecoderStream<S>
where
    S: Stream<Item = Result<Bytes, StreamError>> + Unpin,
{
    type Item = Result<Frame, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(frame) = self.demuxer.next_frame() {
                return Poll::Ready(Some(Ok(frame)));
            }

            if self.done {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    if !chunk.is_empty() {
                        self.received_any = true;
                        self.demuxer.push(&chunk);
                    }
                }
                Poll::Ready(Some(Err(err))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    self.done = true;
                    if !self.received_any {
                        return Poll::Ready(Some(Err(StreamError::EmptyBody)));
                    }
                    let leftover = self.demuxer.pending_len();
                    if leftover > 0 {
                        debug!(leftover, "stream ended with a partial frame, discarding");
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
