use super::HubInner;
use crate::error::SignalRClientError;
use futures::{stream::BoxStream, Stream, StreamExt};
use std::{
    pin::Pin,
    sync::Weak,
    task::{Context, Poll},
};

/// Identifies a streaming invocation so that it can be cancelled.
///
/// The default handle is empty: it belongs to a stream that never started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    invocation_id: Option<String>,
}

impl StreamHandle {
    pub(crate) fn new(invocation_id: String) -> Self {
        StreamHandle {
            invocation_id: Some(invocation_id),
        }
    }

    pub fn invocation_id(&self) -> Option<&str> {
        self.invocation_id.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.invocation_id.is_none()
    }
}

/// Items of a server-to-client stream.
///
/// Ends after the server completes the stream. A failed stream yields the
/// error as its last item. Dropping it cancels the invocation.
pub struct HubStream<T> {
    handle: StreamHandle,
    items: BoxStream<'static, Result<T, SignalRClientError>>,
    hub: Weak<HubInner>,
}

impl<T: Send + 'static> HubStream<T> {
    pub(crate) fn new(
        handle: StreamHandle,
        items: flume::Receiver<Result<T, SignalRClientError>>,
        hub: Weak<HubInner>,
    ) -> Self {
        HubStream {
            handle,
            items: items.into_stream().boxed(),
            hub,
        }
    }

    /// Stream that never started, yielding just `error`.
    pub(crate) fn failed(error: SignalRClientError) -> Self {
        HubStream {
            handle: StreamHandle::default(),
            items: futures::stream::once(async move { Err(error) }).boxed(),
            hub: Weak::new(),
        }
    }
}

impl<T> HubStream<T> {
    pub fn handle(&self) -> &StreamHandle {
        &self.handle
    }
}

impl<T> Stream for HubStream<T> {
    type Item = Result<T, SignalRClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.items.poll_next_unpin(cx)
    }
}

impl<T> Drop for HubStream<T> {
    fn drop(&mut self) {
        if self.handle.is_empty() {
            return;
        }

        if let Some(hub) = self.hub.upgrade() {
            hub.cancel_in_background(&self.handle);
        }
    }
}
