//! Connection settings.

use crate::{
    http::{HttpClient, ReqwestHttpClient},
    negotiate::TransferFormat,
    transport::{DefaultTransportFactory, Transport, TransportFactory},
};
use std::{collections::BTreeMap, sync::Arc};

pub type Headers = BTreeMap<String, String>;

/// Produces the current access token, consulted before every negotiate request and transport start.
pub type TokenProvider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

pub const DEFAULT_MAX_REDIRECTS: usize = 100;

const AUTHORIZATION_HEADER: &str = "Authorization";

/// Authentication for negotiate and further network connection
#[derive(Clone, Default)]
pub enum Auth {
    #[default]
    None,
    Bearer {
        token: String,
    },
    Provider(TokenProvider),
}

impl Auth {
    fn token(&self) -> Option<String> {
        match self {
            Auth::None => None,
            Auth::Bearer { token } => Some(token.clone()),
            Auth::Provider(provider) => provider(),
        }
    }
}

/// Settings of an [`HttpConnection`](crate::connection::HttpConnection).
#[derive(Clone)]
pub struct HttpConnectionOptions {
    /// Sent with the negotiate request and when starting the transport
    pub headers: Headers,
    pub auth: Auth,
    /// Starts the transport directly against the hub url. Only WebSockets can be used this way.
    pub skip_negotiation: bool,
    /// Upper bound on negotiate redirects followed before giving up
    pub max_redirects: usize,
    /// Transfer format required by the hub protocol in use
    pub transfer_format: TransferFormat,
    pub http_client: Arc<dyn HttpClient>,
    /// Used instead of asking `transport_factory` when set
    pub transport: Option<Arc<dyn Transport>>,
    pub transport_factory: Arc<dyn TransportFactory>,
}

impl Default for HttpConnectionOptions {
    fn default() -> Self {
        HttpConnectionOptions {
            headers: Headers::new(),
            auth: Auth::None,
            skip_negotiation: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            transfer_format: TransferFormat::Text,
            http_client: Arc::new(ReqwestHttpClient::default()),
            transport: None,
            transport_factory: Arc::new(DefaultTransportFactory),
        }
    }
}

impl HttpConnectionOptions {
    /// Configured headers plus `Authorization`.
    ///
    /// A token handed out by a negotiate redirect replaces the configured authentication.
    pub(crate) fn request_headers(&self, redirect_token: Option<&str>) -> Headers {
        let mut headers = self.headers.clone();

        let token = redirect_token.map(str::to_owned).or_else(|| self.auth.token());
        if let Some(token) = token {
            headers.insert(AUTHORIZATION_HEADER.to_owned(), format!("Bearer {token}"));
        }

        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_is_consulted_on_every_call() {
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let provider_counter = counter.clone();
        let options = HttpConnectionOptions {
            auth: Auth::Provider(Arc::new(move || {
                let n = provider_counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Some(format!("token-{n}"))
            })),
            ..Default::default()
        };

        assert_eq!(
            Some(&"Bearer token-0".to_owned()),
            options.request_headers(None).get(AUTHORIZATION_HEADER)
        );
        assert_eq!(
            Some(&"Bearer token-1".to_owned()),
            options.request_headers(None).get(AUTHORIZATION_HEADER)
        );
    }

    #[test]
    fn redirect_token_wins() {
        let mut options = HttpConnectionOptions {
            auth: Auth::Bearer {
                token: "configured".into(),
            },
            ..Default::default()
        };
        options.headers.insert("X-Custom".into(), "1".into());

        let headers = options.request_headers(Some("redirected"));

        assert_eq!(Some(&"Bearer redirected".to_owned()), headers.get(AUTHORIZATION_HEADER));
        assert_eq!(Some(&"1".to_owned()), headers.get("X-Custom"));
    }

    #[test]
    fn no_token_no_header() {
        let options = HttpConnectionOptions::default();

        assert!(options.request_headers(None).is_empty());
    }
}
