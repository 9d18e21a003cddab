//! Hub protocol: handshake, message model and wire encoding.

mod converter;
pub mod handshake;
mod json;
mod messages;

pub use self::{
    converter::{JsonTypeConverter, TypeConverter},
    json::{JsonHubProtocol, JSON_PROTOCOL_NAME, JSON_PROTOCOL_VERSION},
    messages::{
        CancelInvocation, Close, Completion, HubMessage, Invocation, MessageType, StreamInvocation,
        StreamItem,
    },
};

use crate::{error::SignalRClientError, messages::Payload, negotiate::TransferFormat};
use std::sync::Arc;

/// Messages decoded from an inbound buffer.
#[derive(Debug, Default)]
pub struct ParsedMessages {
    /// One entry per complete frame, in wire order. A malformed frame yields an
    /// error without affecting its siblings.
    pub messages: Vec<Result<HubMessage, SignalRClientError>>,
    /// Number of leading bytes covered by `messages`. The rest is an incomplete
    /// frame and has to be fed again together with subsequent data.
    pub consumed: usize,
}

/// Encoding used for hub messages.
pub trait HubProtocol: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> u32;

    fn transfer_format(&self) -> TransferFormat;

    fn type_converter(&self) -> Arc<dyn TypeConverter>;

    fn parse_messages(&self, input: &[u8]) -> ParsedMessages;

    fn write_message(&self, message: &HubMessage) -> Result<Payload, SignalRClientError>;
}
