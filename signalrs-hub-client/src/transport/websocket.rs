use super::{Transport, TransportDelegate};
use crate::{config::Headers, error::SignalRClientError, messages::Payload};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::{
    sync::{Mutex, PoisonError, Weak},
    time::{Duration, Instant},
};
use tokio::{net::TcpStream, sync::oneshot};
use tokio_tungstenite::{
    tungstenite::{
        client::IntoClientRequest,
        http::{HeaderName, HeaderValue},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::*;
use url::Url;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const LIFE_SIGN_TIMEOUT: Duration = Duration::from_secs(60);

type WebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Command {
    Send(Message, oneshot::Sender<Result<(), SignalRClientError>>),
    Close,
}

/// [`Transport`] over a WebSocket, using `tokio-tungstenite`.
///
/// The socket is owned by a background task, calls to `send` and `close`
/// are forwarded to it.
#[derive(Default)]
pub struct WebSocketTransport {
    commands: Mutex<Option<flume::Sender<Command>>>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Default::default()
    }

    fn commands(&self) -> Option<flume::Sender<Command>> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn start(&self, url: Url, headers: Headers, delegate: Weak<dyn TransportDelegate>) {
        let (tx, rx) = flume::unbounded();
        *self.commands.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);

        tokio::spawn(
            async move {
                let error = run(url, headers, rx, &delegate).await;

                if let Some(delegate) = delegate.upgrade() {
                    delegate.transport_did_close(error);
                }
            }
            .instrument(debug_span!("websocket")),
        );
    }

    async fn send(&self, data: Payload) -> Result<(), SignalRClientError> {
        let commands = self.commands().ok_or(SignalRClientError::InvalidState)?;

        let message = match data {
            Payload::Text(text) => {
                event!(Level::TRACE, %text, "text message sent");
                Message::Text(text)
            }
            Payload::Binary(bytes) => {
                event!(Level::TRACE, length = bytes.len(), "binary message sent");
                Message::Binary(bytes)
            }
        };

        let (tx, rx) = oneshot::channel();
        commands
            .send_async(Command::Send(message, tx))
            .await
            .map_err(|_| SignalRClientError::InvalidState)?;

        rx.await.map_err(|_| SignalRClientError::InvalidState)?
    }

    async fn close(&self) {
        let commands = self
            .commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(commands) = commands {
            // task may have finished already, in which case the close was reported
            let _ = commands.send_async(Command::Close).await;
        }
    }
}

/// Runs the socket until it closes, returning the error it closed with.
async fn run(
    url: Url,
    headers: Headers,
    commands: flume::Receiver<Command>,
    delegate: &Weak<dyn TransportDelegate>,
) -> Option<SignalRClientError> {
    let websocket = tokio::select! {
        connected = connect(url, headers) => match connected {
            Ok(websocket) => websocket,
            Err(error) => {
                event!(Level::ERROR, %error, "could not open websocket");
                return Some(error);
            }
        },
        _ = wait_for_close(&commands) => {
            event!(Level::DEBUG, "websocket closed before it was opened");
            return None;
        }
    };

    match delegate.upgrade() {
        Some(delegate) => delegate.transport_did_open(),
        None => return None,
    }

    event!(Level::DEBUG, "websocket opened");

    websocket_loop(websocket, commands, delegate).await
}

async fn connect(url: Url, headers: Headers) -> Result<WebSocket, SignalRClientError> {
    let url = websocket_url(url)?;
    let mut request = url.as_str().into_client_request()?;

    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| SignalRClientError::invalid_operation(format!("invalid header name {name}")))?;
        let header_value = HeaderValue::from_str(&value)
            .map_err(|_| SignalRClientError::invalid_operation(format!("invalid value of header {name}")))?;
        request.headers_mut().insert(header_name, header_value);
    }

    event!(Level::DEBUG, %url, "connecting websocket");

    let (websocket, _) = tokio_tungstenite::connect_async(request).await?;

    Ok(websocket)
}

async fn wait_for_close(commands: &flume::Receiver<Command>) {
    loop {
        match commands.recv_async().await {
            Ok(Command::Close) | Err(_) => return,
            Ok(Command::Send(_, reply)) => {
                let _ = reply.send(Err(SignalRClientError::InvalidState));
            }
        }
    }
}

async fn websocket_loop(
    websocket: WebSocket,
    commands: flume::Receiver<Command>,
    delegate: &Weak<dyn TransportDelegate>,
) -> Option<SignalRClientError> {
    let (mut sink, mut stream) = websocket.split();
    let mut last_life_sign = Instant::now();
    let mut health_check = tokio::time::interval(PING_INTERVAL);

    loop {
        tokio::select! {
            _ = health_check.tick() => {
                if last_life_sign.elapsed() > LIFE_SIGN_TIMEOUT {
                    event!(Level::ERROR, "websocket closing due to lack of life signs from server");
                    return Some(SignalRClientError::InvalidState);
                }

                if let Err(error) = sink.send(Message::Ping(Vec::new())).await {
                    event!(Level::ERROR, %error, "could not send ping");
                }
            },
            command = commands.recv_async() => match command {
                Ok(Command::Send(message, reply)) => {
                    let result = sink.send(message).await.map_err(SignalRClientError::from);
                    let _ = reply.send(result);
                }
                Ok(Command::Close) | Err(_) => {
                    event!(Level::DEBUG, "closing websocket");
                    if let Err(error) = sink.close().await {
                        event!(Level::DEBUG, %error, "websocket close handshake failed");
                    }
                    return None;
                }
            },
            received = stream.next() => {
                last_life_sign = Instant::now();

                let message = match received {
                    Some(Ok(message)) => message,
                    Some(Err(error)) => {
                        event!(Level::ERROR, %error, "websocket receive failed");
                        return Some(error.into());
                    }
                    None => return None,
                };

                let payload = match message {
                    Message::Text(text) => {
                        event!(Level::TRACE, %text, "text message received");
                        Payload::Text(text)
                    }
                    Message::Binary(bytes) => {
                        event!(Level::TRACE, length = bytes.len(), "binary message received");
                        Payload::Binary(bytes)
                    }
                    Message::Ping(payload) => {
                        if let Err(error) = sink.send(Message::Pong(payload)).await {
                            event!(Level::ERROR, %error, "could not send pong");
                        }
                        continue;
                    }
                    Message::Close(frame) => {
                        event!(Level::DEBUG, ?frame, "server closed websocket");
                        return None;
                    }
                    Message::Pong(_) | Message::Frame(_) => continue,
                };

                match delegate.upgrade() {
                    Some(delegate) => delegate.transport_did_receive_data(payload),
                    None => return None,
                }
            }
        }
    }
}

/// Maps `http(s)` to `ws(s)`, leaving other schemes alone.
fn websocket_url(mut url: Url) -> Result<Url, SignalRClientError> {
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => return Ok(url),
        other => {
            return Err(SignalRClientError::InvalidUrl {
                reason: format!("scheme {other} cannot be used with WebSockets"),
            })
        }
    };

    url.set_scheme(scheme)
        .map_err(|_| SignalRClientError::InvalidUrl {
            reason: format!("cannot switch {url} to {scheme}"),
        })?;

    Ok(url)
}
