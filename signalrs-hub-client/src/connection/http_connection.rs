use super::{
    state::{ConnectionState, OpenOutcome, StopEvent},
    Connection, ConnectionDelegate,
};
use crate::{
    callback_queue::CallbackQueue,
    config::HttpConnectionOptions,
    error::SignalRClientError,
    messages::Payload,
    negotiate::{
        self, NegotiationResponse, Redirection, TransportDescription, TransportType,
    },
    transport::{Transport, TransportDelegate},
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::Notify;
use tracing::*;
use url::Url;

/// [`Connection`] that negotiates over HTTP and then runs a single transport.
pub struct HttpConnection {
    url: Url,
    options: HttpConnectionOptions,
    inner: Mutex<Inner>,
    /// Signalled whenever `Inner::pending_open` is cleared
    start_finished: Notify,
    callbacks: CallbackQueue,
    this: Weak<HttpConnection>,
}

struct Inner {
    state: ConnectionState,
    /// Set while a start attempt has not resolved yet
    pending_open: bool,
    outcome: OpenOutcome,
    transport: Option<Arc<dyn Transport>>,
    stop_error: Option<SignalRClientError>,
    connection_id: Option<String>,
    delegate: Option<Weak<dyn ConnectionDelegate>>,
}

enum Event {
    Open,
    FailToOpen(SignalRClientError),
    Data(Payload),
    Close(Option<SignalRClientError>),
}

struct Target {
    url: Url,
    access_token: Option<String>,
    connection_id: Option<String>,
    available_transports: Vec<TransportDescription>,
}

impl HttpConnection {
    pub fn new(url: Url, options: HttpConnectionOptions, callbacks: CallbackQueue) -> Arc<Self> {
        Arc::new_cyclic(|this| HttpConnection {
            url,
            options,
            inner: Mutex::new(Inner {
                state: ConnectionState::Initial,
                pending_open: false,
                outcome: OpenOutcome::Pending,
                transport: None,
                stop_error: None,
                connection_id: None,
                delegate: None,
            }),
            start_finished: Notify::new(),
            callbacks,
            this: this.clone(),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to `to` if the current state is `from` (any state when `None`).
    ///
    /// Returns the previous state when the transition happened.
    fn change_state(
        inner: &mut Inner,
        from: Option<ConnectionState>,
        to: ConnectionState,
    ) -> Option<ConnectionState> {
        let previous = inner.state;

        if from.map_or(true, |expected| expected == previous) {
            inner.state = to;
            event!(Level::DEBUG, %previous, current = %to, "connection state changed");
            Some(previous)
        } else {
            event!(
                Level::DEBUG,
                current = %previous,
                requested = %to,
                "connection state change rejected"
            );
            None
        }
    }

    async fn start_internal(self: Arc<Self>) {
        if let Err(error) = self.start_transport().await {
            event!(Level::DEBUG, %error, "connection failed to open");
            self.fail_open(error);
        }
    }

    async fn start_transport(&self) -> Result<(), SignalRClientError> {
        let target = if self.options.skip_negotiation {
            Target {
                url: self.url.clone(),
                access_token: None,
                connection_id: None,
                available_transports: vec![TransportDescription {
                    transport_type: TransportType::WebSockets,
                    transfer_formats: vec![self.options.transfer_format],
                }],
            }
        } else {
            self.negotiate().await?
        };

        let transport = match &self.options.transport {
            Some(transport) => transport.clone(),
            None => self
                .options
                .transport_factory
                .create_transport(&target.available_transports, self.options.transfer_format)?,
        };

        {
            let mut inner = self.lock();
            if inner.state != ConnectionState::Connecting {
                return Err(SignalRClientError::ConnectionIsBeingClosed);
            }

            inner.connection_id = target.connection_id.clone();
            inner.transport = Some(transport.clone());
        }

        let url = match &target.connection_id {
            Some(connection_id) => negotiate::start_url(&target.url, connection_id),
            None => target.url,
        };
        let headers = self.options.request_headers(target.access_token.as_deref());
        let delegate: Weak<dyn TransportDelegate> = self.this.clone();

        event!(Level::DEBUG, %url, "starting transport");

        transport.start(url, headers, delegate);

        Ok(())
    }

    async fn negotiate(&self) -> Result<Target, SignalRClientError> {
        let mut url = self.url.clone();
        let mut access_token: Option<String> = None;
        let mut redirects = 0;

        loop {
            let negotiate_url = negotiate::negotiate_url(&url);
            let headers = self.options.request_headers(access_token.as_deref());

            event!(Level::DEBUG, url = %negotiate_url, "negotiating");

            let response = self.options.http_client.post(&negotiate_url, &headers).await?;

            if response.status_code != 200 {
                return Err(SignalRClientError::WebError {
                    status_code: response.status_code,
                });
            }

            if self.state() != ConnectionState::Connecting {
                return Err(SignalRClientError::ConnectionIsBeingClosed);
            }

            match negotiate::parse_negotiation_response(&response.body)? {
                NegotiationResponse::Negotiation(result) => {
                    event!(
                        Level::DEBUG,
                        connection_id = result.connection_id.as_str(),
                        "negotiation finished"
                    );

                    return Ok(Target {
                        url,
                        access_token,
                        connection_id: Some(result.connection_id),
                        available_transports: result.available_transports,
                    });
                }
                NegotiationResponse::Redirection(Redirection {
                    url: redirect_url,
                    access_token: redirect_token,
                }) => {
                    if redirects == self.options.max_redirects {
                        return Err(SignalRClientError::TooManyRedirects {
                            limit: self.options.max_redirects,
                        });
                    }

                    redirects += 1;
                    event!(Level::DEBUG, url = redirect_url.as_str(), redirects, "negotiation redirected");

                    url = Url::parse(&redirect_url)?;
                    access_token = Some(redirect_token);
                }
            }
        }
    }

    fn fail_open(&self, error: SignalRClientError) {
        let owed = {
            let mut inner = self.lock();
            Self::change_state(&mut inner, None, ConnectionState::Stopped);
            inner.transport = None;
            inner.pending_open = false;
            inner.outcome.finish()
        };

        self.start_finished.notify_waiters();

        match owed {
            Some(StopEvent::FailToOpen) => self.deliver(Event::FailToOpen(error)),
            // start failed after the transport opened, which only a stop can cause
            Some(StopEvent::Close) => self.deliver(Event::Close(Some(error))),
            None => event!(Level::DEBUG, %error, "start failure already reported"),
        }
    }

    /// Waits until the current start attempt resolved.
    async fn wait_for_start(&self) {
        loop {
            let notified = self.start_finished.notified();
            let pending_open = self.lock().pending_open;

            if !pending_open {
                return;
            }

            notified.await;
        }
    }

    async fn stop_internal(self: Arc<Self>) {
        self.wait_for_start().await;

        let transport = self.lock().transport.clone();

        match transport {
            Some(transport) => {
                event!(Level::DEBUG, "closing transport");
                transport.close().await;
            }
            None => {
                let (owed, error) = {
                    let mut inner = self.lock();
                    (inner.outcome.finish(), inner.stop_error.clone())
                };

                match owed {
                    Some(StopEvent::Close) => self.deliver(Event::Close(error)),
                    Some(StopEvent::FailToOpen) => self.deliver(Event::FailToOpen(
                        error.unwrap_or(SignalRClientError::ConnectionIsBeingClosed),
                    )),
                    None => event!(Level::DEBUG, "connection stopped before transport was created"),
                }
            }
        }
    }

    fn deliver(&self, event: Event) {
        let delegate = self.lock().delegate.clone();
        let delegate = match delegate {
            Some(delegate) => delegate,
            None => {
                event!(Level::DEBUG, "no connection delegate, event dropped");
                return;
            }
        };

        self.callbacks.enqueue(async move {
            let delegate = match delegate.upgrade() {
                Some(delegate) => delegate,
                None => return,
            };

            match event {
                Event::Open => delegate.connection_did_open().await,
                Event::FailToOpen(error) => delegate.connection_did_fail_to_open(error).await,
                Event::Data(data) => delegate.connection_did_receive_data(data).await,
                Event::Close(error) => delegate.connection_did_close(error).await,
            }
        });
    }
}

#[async_trait]
impl Connection for HttpConnection {
    fn set_delegate(&self, delegate: Weak<dyn ConnectionDelegate>) {
        self.lock().delegate = Some(delegate);
    }

    fn start(&self) {
        let started = {
            let mut inner = self.lock();
            let started = Self::change_state(
                &mut inner,
                Some(ConnectionState::Initial),
                ConnectionState::Connecting,
            )
            .is_some();

            if started {
                inner.pending_open = true;
            }

            started
        };

        if !started {
            event!(Level::WARN, "start called on a connection that was already started");
            // bypasses the outcome of the attempt that is already under way
            self.deliver(Event::FailToOpen(SignalRClientError::InvalidState));
            return;
        }

        if let Some(this) = self.this.upgrade() {
            self.callbacks
                .runtime()
                .spawn(this.start_internal().instrument(debug_span!("connection start")));
        }
    }

    async fn send(&self, data: Payload) -> Result<(), SignalRClientError> {
        let transport = {
            let inner = self.lock();
            if inner.state != ConnectionState::Connected {
                return Err(SignalRClientError::InvalidState);
            }

            inner.transport.clone()
        };

        match transport {
            Some(transport) => transport.send(data).await,
            None => Err(SignalRClientError::InvalidState),
        }
    }

    fn stop(&self, error: Option<SignalRClientError>) {
        let previous = {
            let mut inner = self.lock();
            if inner.state == ConnectionState::Stopped {
                event!(Level::DEBUG, "connection already stopped");
                return;
            }

            inner.stop_error = error;
            Self::change_state(&mut inner, None, ConnectionState::Stopped)
        };

        if previous == Some(ConnectionState::Initial) {
            return;
        }

        if let Some(this) = self.this.upgrade() {
            self.callbacks
                .runtime()
                .spawn(this.stop_internal().instrument(debug_span!("connection stop")));
        }
    }

    fn connection_id(&self) -> Option<String> {
        self.lock().connection_id.clone()
    }
}

impl TransportDelegate for HttpConnection {
    fn transport_did_open(&self) {
        let opened = {
            let mut inner = self.lock();
            inner.pending_open = false;

            let opened = Self::change_state(
                &mut inner,
                Some(ConnectionState::Connecting),
                ConnectionState::Connected,
            )
            .is_some();

            if opened {
                inner.outcome = OpenOutcome::Opened;
            }

            opened
        };

        self.start_finished.notify_waiters();

        if opened {
            self.deliver(Event::Open);
        } else {
            event!(Level::DEBUG, "transport opened after the connection was stopped");
        }
    }

    fn transport_did_receive_data(&self, data: Payload) {
        self.deliver(Event::Data(data));
    }

    fn transport_did_close(&self, error: Option<SignalRClientError>) {
        let (owed, error) = {
            let mut inner = self.lock();
            Self::change_state(&mut inner, None, ConnectionState::Stopped);
            inner.pending_open = false;
            inner.transport = None;

            let error = inner.stop_error.clone().or(error);
            (inner.outcome.finish(), error)
        };

        self.start_finished.notify_waiters();

        match owed {
            Some(StopEvent::Close) => self.deliver(Event::Close(error)),
            Some(StopEvent::FailToOpen) => self.deliver(Event::FailToOpen(
                error.unwrap_or(SignalRClientError::ConnectionIsBeingClosed),
            )),
            None => event!(Level::DEBUG, "transport closed after close was reported"),
        }
    }
}
