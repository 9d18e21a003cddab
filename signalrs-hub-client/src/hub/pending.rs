use crate::{
    error::SignalRClientError,
    protocol::{Completion, TypeConverter},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;

pub(crate) type InvocationResult = Result<Option<Value>, SignalRClientError>;

/// Entry of the pending invocation table.
///
/// Every handler is resolved exactly once, by [`complete`](Self::complete) or
/// [`fail`](Self::fail), both of which consume it.
pub(crate) enum ServerInvocationHandler {
    Invocation(oneshot::Sender<InvocationResult>),
    Stream(StreamHandler),
}

pub(crate) struct StreamHandler {
    on_item: Box<dyn FnMut(Value) -> Result<(), StreamItemError> + Send>,
    on_complete: Box<dyn FnOnce(Option<SignalRClientError>) + Send>,
}

pub(crate) enum StreamItemError {
    Conversion(SignalRClientError),
    /// Nobody listens for items anymore
    ReceiverDropped,
}

impl ServerInvocationHandler {
    pub(crate) fn complete(self, completion: Completion) {
        let Completion { result, error, .. } = completion;
        let error = error.map(|message| SignalRClientError::HubInvocationError { message });

        match self {
            ServerInvocationHandler::Invocation(tx) => {
                let outcome = match error {
                    Some(error) => Err(error),
                    None => Ok(result),
                };
                let _ = tx.send(outcome);
            }
            ServerInvocationHandler::Stream(handler) => (handler.on_complete)(error),
        }
    }

    pub(crate) fn fail(self, error: SignalRClientError) {
        match self {
            ServerInvocationHandler::Invocation(tx) => {
                let _ = tx.send(Err(error));
            }
            ServerInvocationHandler::Stream(handler) => (handler.on_complete)(Some(error)),
        }
    }

    pub(crate) fn is_stream(&self) -> bool {
        matches!(self, ServerInvocationHandler::Stream(_))
    }
}

impl StreamHandler {
    /// Handler converting items to `T` and forwarding them, and a terminal error if any, to `items`.
    pub(crate) fn forwarding<T>(
        items: flume::Sender<Result<T, SignalRClientError>>,
        converter: Arc<dyn TypeConverter>,
    ) -> Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        let completion = items.clone();

        StreamHandler {
            on_item: Box::new(move |value| {
                let item = converter
                    .convert_from_wire::<T>(value)
                    .map_err(StreamItemError::Conversion)?;

                items
                    .send(Ok(item))
                    .map_err(|_| StreamItemError::ReceiverDropped)
            }),
            on_complete: Box::new(move |error| {
                if let Some(error) = error {
                    let _ = completion.send(Err(error));
                }
            }),
        }
    }

    pub(crate) fn item(&mut self, value: Value) -> Result<(), StreamItemError> {
        (self.on_item)(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::JsonTypeConverter;
    use serde_json::json;

    #[test]
    fn completion_with_error_fails_invocation() {
        let (tx, mut rx) = oneshot::channel();

        ServerInvocationHandler::Invocation(tx).complete(Completion::error("1", "boom"));

        match rx.try_recv().unwrap() {
            Err(SignalRClientError::HubInvocationError { message }) => assert_eq!("boom", message),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn void_completion_resolves_with_none() {
        let (tx, mut rx) = oneshot::channel();

        ServerInvocationHandler::Invocation(tx).complete(Completion::ok("1"));

        assert!(matches!(rx.try_recv().unwrap(), Ok(None)));
    }

    #[test]
    fn stream_forwards_items_and_error() {
        let (tx, rx) = flume::unbounded::<Result<i32, SignalRClientError>>();
        let mut handler = StreamHandler::forwarding(tx, Arc::new(JsonTypeConverter));

        handler.item(json!(1)).ok().unwrap();
        assert!(matches!(
            handler.item(json!("x")),
            Err(StreamItemError::Conversion(SignalRClientError::UnsupportedType { .. }))
        ));
        ServerInvocationHandler::Stream(handler).fail(SignalRClientError::HubInvocationCancelled);

        let received: Vec<_> = rx.drain().collect();
        assert_eq!(2, received.len());
        assert_eq!(1, *received[0].as_ref().unwrap());
        assert!(matches!(received[1], Err(SignalRClientError::HubInvocationCancelled)));
        assert!(rx.is_disconnected());
    }
}
