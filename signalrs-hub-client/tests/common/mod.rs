#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use signalrs_hub_client::{
    config::{Headers, HttpConnectionOptions},
    connection::{ConnectionDelegate, HttpConnection},
    http::{HttpClient, HttpResponse},
    messages::{Payload, RECORD_SEPARATOR},
    transport::{Transport, TransportDelegate},
    CallbackQueue, HubConnection, HubConnectionDelegate, SignalRClientError,
};
use std::{
    collections::VecDeque,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, Weak,
    },
    time::Duration,
};
use url::Url;

pub const HUB_URL: &str = "http://localhost:5000/hub";

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET_PERIOD: Duration = Duration::from_millis(100);

// ============== TRANSPORT ======================== //

/// Transport driven by the test: events are triggered by hand, sent payloads are recorded.
pub struct FakeTransport {
    delegate: Mutex<Option<Weak<dyn TransportDelegate>>>,
    failing_sends: AtomicBool,
    starts_tx: flume::Sender<(Url, Headers)>,
    pub starts: flume::Receiver<(Url, Headers)>,
    sent_tx: flume::Sender<Payload>,
    pub sent: flume::Receiver<Payload>,
    closes_tx: flume::Sender<()>,
    pub closes: flume::Receiver<()>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        let (starts_tx, starts) = flume::unbounded();
        let (sent_tx, sent) = flume::unbounded();
        let (closes_tx, closes) = flume::unbounded();

        Arc::new(FakeTransport {
            delegate: Mutex::new(None),
            failing_sends: AtomicBool::new(false),
            starts_tx,
            starts,
            sent_tx,
            sent,
            closes_tx,
            closes,
        })
    }

    fn delegate(&self) -> Arc<dyn TransportDelegate> {
        self.delegate
            .lock()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade)
            .expect("transport was not started")
    }

    /// While set, `send` fails with [`SignalRClientError::InvalidState`] and records nothing.
    pub fn fail_sends(&self, fail: bool) {
        self.failing_sends.store(fail, Ordering::SeqCst);
    }

    pub async fn wait_started(&self) -> (Url, Headers) {
        within_timeout(self.starts.recv_async()).await.unwrap()
    }

    pub fn open(&self) {
        self.delegate().transport_did_open();
    }

    pub fn receive(&self, text: &str) {
        self.delegate()
            .transport_did_receive_data(Payload::Text(text.to_owned()));
    }

    pub fn close_with(&self, error: Option<SignalRClientError>) {
        self.delegate().transport_did_close(error);
    }

    pub async fn next_sent(&self) -> String {
        let payload = within_timeout(self.sent.recv_async()).await.unwrap();
        match payload {
            Payload::Text(text) => text,
            other => panic!("expected text payload, got {other:?}"),
        }
    }

    pub async fn next_sent_json(&self) -> Value {
        self.next_sent().await.to_json()
    }

    pub async fn assert_nothing_sent(&self) {
        tokio::time::sleep(QUIET_PERIOD).await;
        assert!(self.sent.is_empty(), "unexpected payload sent");
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn start(&self, url: Url, headers: Headers, delegate: Weak<dyn TransportDelegate>) {
        *self.delegate.lock().unwrap() = Some(delegate);
        self.starts_tx.send((url, headers)).unwrap();
    }

    async fn send(&self, data: Payload) -> Result<(), SignalRClientError> {
        if self.failing_sends.load(Ordering::SeqCst) {
            return Err(SignalRClientError::InvalidState);
        }

        self.sent_tx.send(data).unwrap();
        Ok(())
    }

    async fn close(&self) {
        self.closes_tx.send(()).unwrap();

        let delegate = self.delegate.lock().unwrap().as_ref().and_then(Weak::upgrade);
        if let Some(delegate) = delegate {
            delegate.transport_did_close(None);
        }
    }
}

// ============== HTTP ======================== //

pub type HttpResult = Result<HttpResponse, SignalRClientError>;

/// Answers negotiate requests with scripted responses.
pub struct FakeHttpClient {
    responses: Mutex<VecDeque<HttpResult>>,
    gate: Option<flume::Receiver<()>>,
    requests_tx: flume::Sender<(Url, Headers)>,
    pub requests: flume::Receiver<(Url, Headers)>,
}

impl FakeHttpClient {
    pub fn new(responses: impl IntoIterator<Item = HttpResult>) -> Arc<Self> {
        let (requests_tx, requests) = flume::unbounded();

        Arc::new(FakeHttpClient {
            responses: Mutex::new(responses.into_iter().collect()),
            gate: None,
            requests_tx,
            requests,
        })
    }

    /// Client holding every response back until the returned sender releases it.
    pub fn gated(responses: impl IntoIterator<Item = HttpResult>) -> (Arc<Self>, flume::Sender<()>) {
        let (requests_tx, requests) = flume::unbounded();
        let (release, gate) = flume::unbounded();

        let client = Arc::new(FakeHttpClient {
            responses: Mutex::new(responses.into_iter().collect()),
            gate: Some(gate),
            requests_tx,
            requests,
        });

        (client, release)
    }

    pub async fn next_request(&self) -> (Url, Headers) {
        within_timeout(self.requests.recv_async()).await.unwrap()
    }
}

#[async_trait]
impl HttpClient for FakeHttpClient {
    async fn post(&self, url: &Url, headers: &Headers) -> HttpResult {
        self.requests_tx.send((url.clone(), headers.clone())).unwrap();

        if let Some(gate) = &self.gate {
            gate.recv_async().await.unwrap();
        }

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted response left")
    }
}

pub fn ok(body: Value) -> HttpResult {
    Ok(HttpResponse {
        status_code: 200,
        body: body.to_string().into_bytes(),
    })
}

pub fn status(status_code: u16) -> HttpResult {
    Ok(HttpResponse {
        status_code,
        body: Vec::new(),
    })
}

pub fn negotiation(connection_id: &str) -> HttpResult {
    ok(serde_json::json!({
        "connectionId": connection_id,
        "availableTransports": [
            { "transport": "WebSockets", "transferFormats": ["Text", "Binary"] }
        ]
    }))
}

pub fn redirect(url: &str, access_token: &str) -> HttpResult {
    ok(serde_json::json!({ "url": url, "accessToken": access_token }))
}

// ============== DELEGATES ======================== //

#[derive(Debug)]
pub enum ConnectionEvent {
    Open,
    FailToOpen(SignalRClientError),
    Data(Payload),
    Close(Option<SignalRClientError>),
}

pub struct RecordingConnectionDelegate {
    events: flume::Sender<ConnectionEvent>,
}

impl RecordingConnectionDelegate {
    pub fn new() -> (Arc<Self>, flume::Receiver<ConnectionEvent>) {
        let (events, rx) = flume::unbounded();
        (Arc::new(RecordingConnectionDelegate { events }), rx)
    }
}

#[async_trait]
impl ConnectionDelegate for RecordingConnectionDelegate {
    async fn connection_did_open(&self) {
        let _ = self.events.send(ConnectionEvent::Open);
    }

    async fn connection_did_fail_to_open(&self, error: SignalRClientError) {
        let _ = self.events.send(ConnectionEvent::FailToOpen(error));
    }

    async fn connection_did_receive_data(&self, data: Payload) {
        let _ = self.events.send(ConnectionEvent::Data(data));
    }

    async fn connection_did_close(&self, error: Option<SignalRClientError>) {
        let _ = self.events.send(ConnectionEvent::Close(error));
    }
}

#[derive(Debug)]
pub enum HubEvent {
    Open,
    FailToOpen(SignalRClientError),
    Close(Option<SignalRClientError>),
}

pub struct RecordingHubDelegate {
    events: flume::Sender<HubEvent>,
}

impl RecordingHubDelegate {
    pub fn new() -> (Arc<Self>, flume::Receiver<HubEvent>) {
        let (events, rx) = flume::unbounded();
        (Arc::new(RecordingHubDelegate { events }), rx)
    }
}

impl HubConnectionDelegate for RecordingHubDelegate {
    fn connection_did_open(&self) {
        let _ = self.events.send(HubEvent::Open);
    }

    fn connection_did_fail_to_open(&self, error: SignalRClientError) {
        let _ = self.events.send(HubEvent::FailToOpen(error));
    }

    fn connection_did_close(&self, error: Option<SignalRClientError>) {
        let _ = self.events.send(HubEvent::Close(error));
    }
}

// ============== BUILDERS ======================== //

pub fn options(http: Arc<FakeHttpClient>, transport: Arc<FakeTransport>) -> HttpConnectionOptions {
    HttpConnectionOptions {
        http_client: http,
        transport: Some(transport),
        ..Default::default()
    }
}

pub fn http_connection(options: HttpConnectionOptions) -> Arc<HttpConnection> {
    let callbacks = CallbackQueue::new().unwrap();
    HttpConnection::new(Url::parse(HUB_URL).unwrap(), options, callbacks)
}

pub struct TestHub {
    pub hub: HubConnection,
    pub transport: Arc<FakeTransport>,
    pub events: flume::Receiver<HubEvent>,
}

/// Hub connection over a fake transport, connected up to the handshake.
pub async fn hub_awaiting_handshake() -> TestHub {
    let transport = FakeTransport::new();
    let http = FakeHttpClient::new([negotiation("connection-1")]);
    let connection = http_connection(options(http, transport.clone()));
    let (delegate, events) = RecordingHubDelegate::new();

    let hub = HubConnection::new(
        connection,
        Arc::new(signalrs_hub_client::protocol::JsonHubProtocol::new()),
        Some(delegate),
    );

    hub.start();
    transport.wait_started().await;
    transport.open();

    let handshake = transport.next_sent().await;
    assert_eq!(
        format!("{{\"protocol\":\"json\",\"version\":1}}{RECORD_SEPARATOR}"),
        handshake
    );

    TestHub {
        hub,
        transport,
        events,
    }
}

/// Hub connection over a fake transport with a completed handshake.
pub async fn open_hub() -> TestHub {
    let test_hub = hub_awaiting_handshake().await;

    test_hub.transport.receive("{}\u{1e}");
    assert!(matches!(next_event(&test_hub.events).await, HubEvent::Open));

    test_hub
}

// ============== HELPERS ======================== //

pub async fn within_timeout<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(TIMEOUT, future)
        .await
        .expect("timed out")
}

pub async fn next_event<T>(events: &flume::Receiver<T>) -> T {
    within_timeout(events.recv_async()).await.unwrap()
}

pub async fn assert_no_event<T: std::fmt::Debug>(events: &flume::Receiver<T>) {
    tokio::time::sleep(QUIET_PERIOD).await;
    if let Ok(event) = events.try_recv() {
        panic!("unexpected event {event:?}");
    }
}

pub trait StringExt {
    fn to_json(&self) -> Value;
}

impl StringExt for String {
    fn to_json(&self) -> Value {
        let frame = self
            .strip_suffix(RECORD_SEPARATOR)
            .expect("frame is not terminated with record separator");
        Value::from_str(frame).unwrap()
    }
}

pub fn frame(value: Value) -> String {
    format!("{value}{RECORD_SEPARATOR}")
}
