//! Transports carry hub protocol frames between client and server.
//!
//! A [`Transport`] is driven by its owning connection: it is started once per
//! connection attempt and reports what happens through a [`TransportDelegate`].

mod websocket;

pub use self::websocket::WebSocketTransport;

use crate::{
    config::Headers,
    error::SignalRClientError,
    messages::Payload,
    negotiate::{TransferFormat, TransportDescription, TransportType},
};
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tracing::*;
use url::Url;

/// Receives transport events.
///
/// For one `start` a transport reports either `transport_did_close` alone
/// (it could not open) or `transport_did_open` followed by any number of
/// `transport_did_receive_data` and a final `transport_did_close`.
pub trait TransportDelegate: Send + Sync {
    fn transport_did_open(&self);

    fn transport_did_receive_data(&self, data: Payload);

    fn transport_did_close(&self, error: Option<SignalRClientError>);
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Starts connecting to `url` in the background.
    fn start(&self, url: Url, headers: Headers, delegate: Weak<dyn TransportDelegate>);

    async fn send(&self, data: Payload) -> Result<(), SignalRClientError>;

    /// Requests the transport to close. The delegate is told once it did.
    async fn close(&self);
}

/// Picks a transport out of the ones offered by the server.
pub trait TransportFactory: Send + Sync {
    fn create_transport(
        &self,
        available_transports: &[TransportDescription],
        transfer_format: TransferFormat,
    ) -> Result<Arc<dyn Transport>, SignalRClientError>;
}

/// Creates a [`WebSocketTransport`] whenever the server offers WebSockets with the required transfer format.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create_transport(
        &self,
        available_transports: &[TransportDescription],
        transfer_format: TransferFormat,
    ) -> Result<Arc<dyn Transport>, SignalRClientError> {
        let supported = available_transports.iter().any(|description| {
            description.transport_type == TransportType::WebSockets
                && description.transfer_formats.contains(&transfer_format)
        });

        if !supported {
            warn!("server does not offer WebSockets with {transfer_format} transfer format");
            return Err(SignalRClientError::NoSupportedTransport);
        }

        Ok(Arc::new(WebSocketTransport::new()))
    }
}
