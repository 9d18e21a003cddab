//! Hub connection: handshake, invocation correlation and message dispatch

pub(crate) mod arguments;
mod functions;
pub(crate) mod invocation;
mod pending;
mod stream;

pub use self::{
    arguments::{HubArgument, HubArguments},
    functions::Handler,
    invocation::{FromInvocation, HubInvocation},
    stream::{HubStream, StreamHandle},
};

use self::{
    functions::{HandlerWrapper, HubMethod},
    pending::{ServerInvocationHandler, StreamHandler, StreamItemError},
};
use crate::{
    connection::{Connection, ConnectionDelegate},
    error::SignalRClientError,
    invocation::InvocationBuilder,
    messages::Payload,
    negotiate::TransferFormat,
    protocol::{
        handshake::{self, HandshakeRequest},
        CancelInvocation, Completion, HubMessage, HubProtocol, Invocation, StreamInvocation,
        StreamItem, TypeConverter,
    },
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};
use tokio::sync::oneshot;
use tracing::*;

/// Application-level connection events.
///
/// Called on the connection's callback queue. Every method defaults to doing nothing.
pub trait HubConnectionDelegate: Send + Sync {
    /// Handshake succeeded, invocations can be made
    fn connection_did_open(&self) {}

    fn connection_did_fail_to_open(&self, _error: SignalRClientError) {}

    fn connection_did_close(&self, _error: Option<SignalRClientError>) {}
}

/// Client of a SignalR hub.
///
/// Cheap to clone, all clones share one connection.
#[derive(Clone)]
pub struct HubConnection {
    inner: Arc<HubInner>,
}

pub(crate) struct HubInner {
    connection: Arc<dyn Connection>,
    protocol: Arc<dyn HubProtocol>,
    delegate: Option<Arc<dyn HubConnectionDelegate>>,
    state: Mutex<HubState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HubStatus {
    AwaitingHandshake,
    Open,
    Failed,
    Closed,
}

struct HubState {
    status: HubStatus,
    started: bool,
    pending: HashMap<String, ServerInvocationHandler>,
    methods: HashMap<String, Arc<dyn HubMethod>>,
    next_invocation_id: u64,
    /// Received bytes not forming a complete frame yet
    buffer: Vec<u8>,
}

impl HubConnection {
    pub fn new(
        connection: Arc<dyn Connection>,
        protocol: Arc<dyn HubProtocol>,
        delegate: Option<Arc<dyn HubConnectionDelegate>>,
    ) -> Self {
        let inner = Arc::new(HubInner {
            connection,
            protocol,
            delegate,
            state: Mutex::new(HubState {
                status: HubStatus::AwaitingHandshake,
                started: false,
                pending: HashMap::new(),
                methods: HashMap::new(),
                next_invocation_id: 0,
                buffer: Vec::new(),
            }),
        });

        let connection_delegate: Weak<dyn ConnectionDelegate> = Arc::downgrade(&inner) as Weak<HubInner>;
        inner.connection.set_delegate(connection_delegate);

        HubConnection { inner }
    }

    /// Starts the connection. The outcome is reported to the [`HubConnectionDelegate`].
    ///
    /// A hub connection starts once. Later calls report
    /// [`SignalRClientError::InvalidState`] right away and leave the running
    /// connection alone.
    pub fn start(&self) {
        let already_started = std::mem::replace(&mut self.inner.lock().started, true);

        if already_started {
            warn!("start called on a hub connection that was already started");
            if let Some(delegate) = &self.inner.delegate {
                delegate.connection_did_fail_to_open(SignalRClientError::InvalidState);
            }
            return;
        }

        self.inner.connection.start();
    }

    pub fn stop(&self) {
        self.inner.connection.stop(None);
    }

    pub fn connection_id(&self) -> Option<String> {
        self.inner.connection.connection_id()
    }

    /// Registers a client-side method the server can invoke.
    ///
    /// A later registration under the same name replaces the earlier one.
    ///
    /// # Example
    /// ```rust,no_run
    /// # fn register(hub: &signalrs_hub_client::HubConnection) {
    /// hub.on("Send", |user: String, message: String| {
    ///     println!("{user}: {message}");
    /// });
    /// # }
    /// ```
    pub fn on<H, Args>(&self, name: impl ToString, handler: H)
    where
        H: Handler<Args>,
        Args: 'static,
    {
        let name = name.to_string();
        let method: Arc<dyn HubMethod> = Arc::new(HandlerWrapper::<H, Args>::from(handler));

        if self.inner.lock().methods.insert(name.clone(), method).is_some() {
            warn!("overwritten method {}", name);
        }
    }

    pub(crate) fn type_converter(&self) -> Arc<dyn TypeConverter> {
        self.inner.protocol.type_converter()
    }

    /// Starts building an invocation of a hub method.
    pub fn method(&self, method: impl ToString) -> InvocationBuilder<'_> {
        InvocationBuilder::new(self, method)
    }

    /// Invokes a hub method without waiting for its completion.
    pub async fn send(
        &self,
        method: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Result<(), SignalRClientError> {
        self.inner.ensure_open()?;

        let message = HubMessage::Invocation(Invocation::non_blocking(method, arguments));
        let payload = self.inner.protocol.write_message(&message)?;

        self.inner.connection.send(payload).await?;

        event!(Level::DEBUG, "message sent");

        Ok(())
    }

    /// Invokes a hub method and waits for its completion.
    ///
    /// Resolves with `None` when the method returned nothing.
    pub async fn invoke(
        &self,
        method: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Result<Option<Value>, SignalRClientError> {
        let (tx, rx) = oneshot::channel();
        let invocation_id = self.inner.register(ServerInvocationHandler::Invocation(tx))?;

        let message = HubMessage::Invocation(Invocation::with_id(
            invocation_id.clone(),
            method,
            arguments,
        ));

        if let Err(error) = self.inner.send_registered(&invocation_id, &message).await {
            if self.inner.remove_pending(&invocation_id).is_some() {
                return Err(error);
            }
        }

        let result = rx
            .await
            .map_err(|_| SignalRClientError::HubInvocationCancelled)?;

        event!(Level::DEBUG, %invocation_id, "response received");

        result
    }

    /// Invokes a streaming hub method.
    ///
    /// Errors, including failing to start the invocation, are yielded by the stream.
    pub async fn stream<T>(&self, method: impl Into<String>, arguments: Vec<Value>) -> HubStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = flume::unbounded();
        let handler = StreamHandler::forwarding::<T>(tx, self.inner.protocol.type_converter());

        let invocation_id = match self.inner.register(ServerInvocationHandler::Stream(handler)) {
            Ok(invocation_id) => invocation_id,
            Err(error) => return HubStream::failed(error),
        };

        let message = HubMessage::StreamInvocation(StreamInvocation::new(
            invocation_id.clone(),
            method,
            arguments,
        ));

        if let Err(error) = self.inner.send_registered(&invocation_id, &message).await {
            if let Some(handler) = self.inner.remove_pending(&invocation_id) {
                handler.fail(error);
            }
        }

        HubStream::new(
            StreamHandle::new(invocation_id),
            rx,
            Arc::downgrade(&self.inner),
        )
    }

    /// Cancels a streaming invocation.
    ///
    /// The stream ends after the items received so far. Items arriving later
    /// are dropped. Cancelling a finished or already cancelled stream does nothing.
    pub async fn cancel_stream_invocation(
        &self,
        handle: &StreamHandle,
    ) -> Result<(), SignalRClientError> {
        let invocation_id = handle
            .invocation_id()
            .ok_or_else(|| SignalRClientError::invalid_operation("stream handle is empty"))?;

        if self.inner.remove_pending(invocation_id).is_none() {
            event!(Level::DEBUG, invocation_id, "stream already finished");
            return Ok(());
        }

        self.inner.send_cancel(invocation_id).await
    }
}

impl HubInner {
    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<(), SignalRClientError> {
        check_open(self.lock().status)
    }

    /// Allocates an invocation id and stores `handler` under it.
    fn register(&self, handler: ServerInvocationHandler) -> Result<String, SignalRClientError> {
        let mut state = self.lock();
        check_open(state.status)?;

        state.next_invocation_id += 1;
        let invocation_id = state.next_invocation_id.to_string();
        state.pending.insert(invocation_id.clone(), handler);

        Ok(invocation_id)
    }

    fn remove_pending(&self, invocation_id: &str) -> Option<ServerInvocationHandler> {
        self.lock().pending.remove(invocation_id)
    }

    async fn send_registered(
        &self,
        invocation_id: &str,
        message: &HubMessage,
    ) -> Result<(), SignalRClientError> {
        let payload = self.protocol.write_message(message)?;
        self.connection.send(payload).await?;

        event!(Level::DEBUG, invocation_id, "invocation sent");

        Ok(())
    }

    async fn send_cancel(&self, invocation_id: &str) -> Result<(), SignalRClientError> {
        let message = HubMessage::CancelInvocation(CancelInvocation {
            invocation_id: invocation_id.to_owned(),
        });
        let payload = self.protocol.write_message(&message)?;

        self.connection.send(payload).await
    }

    /// Cancels from a context that cannot wait for the cancel message to be sent.
    pub(crate) fn cancel_in_background(self: Arc<Self>, handle: &StreamHandle) {
        let invocation_id = match handle.invocation_id() {
            Some(invocation_id) => invocation_id.to_owned(),
            None => return,
        };

        if self.remove_pending(&invocation_id).is_none() {
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                event!(Level::DEBUG, %invocation_id, "no runtime to send stream cancellation");
                return;
            }
        };

        runtime.spawn(async move {
            if let Err(error) = self.send_cancel(&invocation_id).await {
                event!(Level::DEBUG, %invocation_id, %error, "stream cancellation not sent");
            }
        });
    }

    fn fail_handshake(&self, error: SignalRClientError) {
        {
            let mut state = self.lock();
            if state.status != HubStatus::AwaitingHandshake {
                return;
            }
            state.status = HubStatus::Failed;
            state.buffer.clear();
        }

        event!(Level::ERROR, %error, "handshake failed");

        if let Some(delegate) = &self.delegate {
            delegate.connection_did_fail_to_open(error.clone());
        }

        self.connection.stop(Some(error));
    }

    /// Feeds received bytes, returning the complete messages they finish.
    fn receive(&self, data: &[u8]) -> Received {
        let mut state = self.lock();
        let mut opened = false;
        let status = state.status;

        match status {
            HubStatus::AwaitingHandshake => {
                state.buffer.extend_from_slice(data);

                let response = handshake::parse_response(&state.buffer)
                    .map(|response| (response.result, response.remainder.to_vec()));

                match response {
                    None => return Received::default(),
                    Some((Err(error), _)) => {
                        return Received {
                            handshake_error: Some(error),
                            ..Default::default()
                        };
                    }
                    Some((Ok(()), remainder)) => {
                        event!(Level::DEBUG, "handshake completed");
                        state.status = HubStatus::Open;
                        state.buffer = remainder;
                        opened = true;
                    }
                }
            }
            HubStatus::Open => state.buffer.extend_from_slice(data),
            HubStatus::Failed | HubStatus::Closed => {
                event!(Level::DEBUG, length = data.len(), "data received after the hub stopped");
                return Received::default();
            }
        }

        let parsed = self.protocol.parse_messages(&state.buffer);
        state.buffer.drain(..parsed.consumed);

        Received {
            opened,
            messages: parsed.messages,
            handshake_error: None,
        }
    }

    fn dispatch(&self, message: HubMessage) {
        match message {
            HubMessage::Completion(completion) => self.receive_completion(completion),
            HubMessage::StreamItem(item) => self.receive_stream_item(item),
            HubMessage::Invocation(invocation) => self.receive_invocation(invocation),
            HubMessage::Close(close) => {
                info!("close received");
                let error = close
                    .error
                    .map(|message| SignalRClientError::ServerClosed { message });
                self.connection.stop(error);
            }
            HubMessage::Ping => trace!("ping received"),
            other => warn!("received unsupported message type: {}", other.message_type()),
        }
    }

    fn receive_completion(&self, completion: Completion) {
        match self.remove_pending(&completion.invocation_id) {
            Some(handler) => handler.complete(completion),
            None => warn!(
                invocation_id = completion.invocation_id.as_str(),
                "received completion with unknown id"
            ),
        }
    }

    fn receive_stream_item(&self, item: StreamItem) {
        let StreamItem {
            invocation_id,
            item,
        } = item;

        let (handler, error) = {
            let mut state = self.lock();

            let error = match state.pending.get_mut(&invocation_id) {
                None => {
                    // expected after a cancellation
                    event!(Level::DEBUG, %invocation_id, "stream item for unknown invocation dropped");
                    return;
                }
                Some(ServerInvocationHandler::Stream(handler)) => match handler.item(item) {
                    Ok(()) => return,
                    Err(error) => error,
                },
                Some(handler) => {
                    debug_assert!(!handler.is_stream());
                    StreamItemError::Conversion(SignalRClientError::protocol_violation(format!(
                        "stream item received for non-streaming invocation {invocation_id}"
                    )))
                }
            };

            (state.pending.remove(&invocation_id), error)
        };

        match (handler, error) {
            (Some(handler), StreamItemError::Conversion(error)) => {
                warn!(%invocation_id, %error, "stream item rejected");
                handler.fail(error);
            }
            (_, _) => event!(Level::DEBUG, %invocation_id, "stream consumer is gone"),
        }
    }

    fn receive_invocation(&self, invocation: Invocation) {
        let Invocation {
            target, arguments, ..
        } = invocation;

        let method = self.lock().methods.get(&target).cloned();

        let method = match method {
            Some(method) => method,
            None => {
                event!(Level::DEBUG, method = %target, "no client method registered");
                return;
            }
        };

        let request = HubInvocation::new(target.as_str(), arguments, self.protocol.type_converter());

        if let Err(error) = method.call(request) {
            warn!(method = %target, %error, "client method invocation failed");
        }
    }
}

#[derive(Default)]
struct Received {
    opened: bool,
    messages: Vec<Result<HubMessage, SignalRClientError>>,
    handshake_error: Option<SignalRClientError>,
}

fn check_open(status: HubStatus) -> Result<(), SignalRClientError> {
    match status {
        HubStatus::Open => Ok(()),
        HubStatus::AwaitingHandshake => Err(SignalRClientError::invalid_operation(
            "handshake has not completed",
        )),
        HubStatus::Failed | HubStatus::Closed => Err(SignalRClientError::invalid_operation(
            "hub connection is not open",
        )),
    }
}

#[async_trait]
impl ConnectionDelegate for HubInner {
    async fn connection_did_open(&self) {
        event!(Level::DEBUG, "connection opened, sending handshake");

        let request = HandshakeRequest::new(self.protocol.name(), self.protocol.version());

        let result = match request.to_frame() {
            Ok(frame) => {
                let payload = match self.protocol.transfer_format() {
                    TransferFormat::Text => Payload::Text(frame),
                    TransferFormat::Binary => Payload::Binary(frame.into_bytes()),
                };
                self.connection.send(payload).await
            }
            Err(error) => Err(error),
        };

        if let Err(error) = result {
            self.fail_handshake(error);
        }
    }

    async fn connection_did_fail_to_open(&self, error: SignalRClientError) {
        {
            let mut state = self.lock();
            if state.status == HubStatus::AwaitingHandshake {
                state.status = HubStatus::Failed;
            }
        }

        event!(Level::DEBUG, %error, "connection failed to open");

        if let Some(delegate) = &self.delegate {
            delegate.connection_did_fail_to_open(error);
        }
    }

    async fn connection_did_receive_data(&self, data: Payload) {
        let received = self.receive(data.as_bytes());

        if let Some(error) = received.handshake_error {
            self.fail_handshake(error);
            return;
        }

        if received.opened {
            if let Some(delegate) = &self.delegate {
                delegate.connection_did_open();
            }
        }

        for message in received.messages {
            match message {
                Ok(message) => self.dispatch(message),
                Err(error) => warn!(%error, "dropped malformed message"),
            }
        }
    }

    async fn connection_did_close(&self, error: Option<SignalRClientError>) {
        let (pending, status) = {
            let mut state = self.lock();
            state.buffer.clear();
            let status = std::mem::replace(&mut state.status, HubStatus::Closed);
            (std::mem::take(&mut state.pending), status)
        };

        let cleanup_error = error
            .clone()
            .unwrap_or(SignalRClientError::HubInvocationCancelled);

        for (invocation_id, handler) in pending {
            event!(Level::DEBUG, %invocation_id, "invocation cancelled by connection close");
            handler.fail(cleanup_error.clone());
        }

        let delegate = match &self.delegate {
            Some(delegate) => delegate,
            None => return,
        };

        match status {
            HubStatus::Open => delegate.connection_did_close(error),
            HubStatus::AwaitingHandshake => delegate.connection_did_fail_to_open(
                error.unwrap_or(SignalRClientError::ConnectionIsBeingClosed),
            ),
            HubStatus::Failed | HubStatus::Closed => {}
        }
    }
}
