//! A response-body wrapper that forwards every byte to the caller unchanged
//! while mirroring up to `max_bytes` into a side buffer for capture — the
//! "tee" spec §4.5 step 4 requires so interception never starves the
//! caller's own read of the response.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use http_body::{Body as HttpBody, Frame};
use pin_project_lite::pin_project;

type OnComplete = Box<dyn FnOnce(Vec<u8>) + Send>;

pin_project! {
    pub struct TeeBody {
        #[pin]
        inner: Body,
        captured: Vec<u8>,
        max_bytes: usize,
        on_complete: Option<OnComplete>,
    }
}

impl TeeBody {
    pub fn new(inner: Body, max_bytes: usize, on_complete: OnComplete) -> Self {
        Self {
            inner,
            captured: Vec::new(),
            max_bytes,
            on_complete: Some(on_complete),
        }
    }

    fn finish(self: Pin<&mut Self>) {
        let this = self.project();
        if let Some(on_complete) = this.on_complete.take() {
            on_complete(std::mem::take(this.captured));
        }
    }
}

impl HttpBody for TeeBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.as_mut().project();
        match this.inner.as_mut().poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    let remaining = this.max_bytes.saturating_sub(this.captured.len());
                    if remaining > 0 {
                        let take = remaining.min(data.len());
                        this.captured.extend_from_slice(&data[..take]);
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(None) => {
                self.finish();
                Poll::Ready(None)
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }
}
