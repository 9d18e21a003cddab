//! Transport agnostic connection: negotiation, transport start and stop sequencing.

mod http_connection;
mod state;

pub use self::{http_connection::HttpConnection, state::ConnectionState};

use crate::{error::SignalRClientError, messages::Payload};
use async_trait::async_trait;
use std::sync::Weak;

/// Receives the events of a [`Connection`].
///
/// Events are delivered one at a time, in order, on the connection's
/// [`CallbackQueue`](crate::CallbackQueue). For a single `start` the delegate
/// observes either `connection_did_fail_to_open`, or `connection_did_open`
/// followed by data and exactly one `connection_did_close`.
#[async_trait]
pub trait ConnectionDelegate: Send + Sync {
    async fn connection_did_open(&self);

    async fn connection_did_fail_to_open(&self, error: SignalRClientError);

    async fn connection_did_receive_data(&self, data: Payload);

    async fn connection_did_close(&self, error: Option<SignalRClientError>);
}

#[async_trait]
pub trait Connection: Send + Sync {
    fn set_delegate(&self, delegate: Weak<dyn ConnectionDelegate>);

    /// Starts connecting in the background. The outcome is reported to the delegate.
    fn start(&self);

    /// Fails with [`SignalRClientError::InvalidState`] unless the connection is open.
    async fn send(&self, data: Payload) -> Result<(), SignalRClientError>;

    /// Stops the connection. Calling it on a stopped connection does nothing.
    ///
    /// `error` takes precedence over whatever error the transport closes with.
    fn stop(&self, error: Option<SignalRClientError>);

    /// Id assigned by the server during negotiation.
    fn connection_id(&self) -> Option<String>;
}
