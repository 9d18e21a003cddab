//! Hub connection builder

use crate::{
    callback_queue::CallbackQueue,
    config::{Auth, HttpConnectionOptions},
    connection::HttpConnection,
    http::HttpClient,
    hub::{HubConnection, HubConnectionDelegate},
    protocol::{HubProtocol, JsonHubProtocol},
    transport::{Transport, TransportFactory},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::*;
use url::Url;

/// [`HubConnection`] builder.
///
/// Allows configuring connection and behavior details.
///
/// # Example
/// ```rust, no_run
/// use signalrs_hub_client::HubConnection;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let hub = HubConnection::builder("http://localhost:5261/echo")
///         .use_header("X-Client", "sample")
///         .use_max_redirects(10)
///         .build()?;
///
///     hub.start();
/// # Ok(())
/// }
/// ```
pub struct HubConnectionBuilder {
    url: String,
    options: HttpConnectionOptions,
    protocol: Arc<dyn HubProtocol>,
    delegate: Option<Arc<dyn HubConnectionDelegate>>,
}

/// Errors that can occur during building of the client
#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("invalid hub url")]
    Url {
        #[from]
        source: url::ParseError,
    },
    #[error("hub connection has to be built within a tokio runtime")]
    NoRuntime {
        #[from]
        source: tokio::runtime::TryCurrentError,
    },
}

impl HubConnection {
    pub fn builder(url: impl ToString) -> HubConnectionBuilder {
        HubConnectionBuilder::new(url)
    }
}

impl HubConnectionBuilder {
    pub fn new(url: impl ToString) -> Self {
        HubConnectionBuilder {
            url: url.to_string(),
            options: Default::default(),
            protocol: Arc::new(JsonHubProtocol::new()),
            delegate: None,
        }
    }

    /// Specifies authentication to use
    pub fn use_authentication(mut self, auth: Auth) -> Self {
        self.options.auth = auth;
        self
    }

    /// Adds a header sent with the negotiate request and when starting the transport.
    pub fn use_header(mut self, name: impl ToString, value: impl ToString) -> Self {
        self.options.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Specifies a function asked for a bearer token before every request.
    ///
    /// Replaces authentication set with [`use_authentication`](Self::use_authentication).
    pub fn use_access_token_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.options.auth = Auth::Provider(Arc::new(provider));
        self
    }

    /// Connects straight to the hub url without negotiating.
    ///
    /// Only possible when the server allows WebSockets without negotiation.
    pub fn skip_negotiation(mut self) -> Self {
        self.options.skip_negotiation = true;
        self
    }

    /// Limits how many negotiate redirects are followed.
    pub fn use_max_redirects(mut self, max_redirects: usize) -> Self {
        self.options.max_redirects = max_redirects;
        self
    }

    /// Specifies the hub protocol. JSON is used by default.
    pub fn use_protocol(mut self, protocol: impl HubProtocol + 'static) -> Self {
        self.protocol = Arc::new(protocol);
        self
    }

    /// Uses the given transport instead of one created by the transport factory.
    pub fn use_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.options.transport = Some(transport);
        self
    }

    pub fn use_transport_factory(mut self, factory: impl TransportFactory + 'static) -> Self {
        self.options.transport_factory = Arc::new(factory);
        self
    }

    /// Specifies the client used for negotiation.
    pub fn use_http_client(mut self, client: impl HttpClient + 'static) -> Self {
        self.options.http_client = Arc::new(client);
        self
    }

    /// Specifies a delegate notified about the connection opening and closing.
    pub fn with_delegate(mut self, delegate: Arc<dyn HubConnectionDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Builds the hub connection.
    ///
    /// Nothing is sent until [`HubConnection::start`] is called.
    pub fn build(self) -> Result<HubConnection, BuilderError> {
        let url = Url::parse(&self.url)?;
        let callbacks = CallbackQueue::new()?;

        let mut options = self.options;
        options.transfer_format = self.protocol.transfer_format();

        let connection = HttpConnection::new(url, options, callbacks);

        event!(Level::DEBUG, protocol = self.protocol.name(), "constructed hub connection");

        Ok(HubConnection::new(connection, self.protocol, self.delegate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_url_is_rejected() {
        let result = HubConnection::builder("not a url").build();

        assert!(matches!(result, Err(BuilderError::Url { .. })));
    }

    #[test]
    fn runtime_is_required() {
        let result = HubConnection::builder("http://localhost:5000/hub").build();

        assert!(matches!(result, Err(BuilderError::NoRuntime { .. })));
    }

    #[tokio::test]
    async fn builds_idle_connection() {
        let hub = HubConnection::builder("http://localhost:5000/hub")
            .use_header("X-Test", "1")
            .skip_negotiation()
            .build()
            .unwrap();

        assert_eq!(None, hub.connection_id());
    }
}
