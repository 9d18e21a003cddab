use crate::{
    error::SignalRClientError,
    messages::{self, RECORD_SEPARATOR_BYTE},
};
use serde::Serialize;
use serde_json::Value;

const INVALID_HANDSHAKE_RESPONSE: &str = "invalid handshake response";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
/// Sent by the client to agree on the message format.
pub struct HandshakeRequest {
    protocol: String,
    version: u32,
}

impl HandshakeRequest {
    pub fn new(protocol: impl ToString, version: u32) -> Self {
        HandshakeRequest {
            protocol: protocol.to_string(),
            version,
        }
    }

    /// Record-separator terminated JSON text.
    pub fn to_frame(&self) -> Result<String, SignalRClientError> {
        Ok(messages::to_json(self)?)
    }
}

/// Outcome of the first complete frame received after the transport opened.
#[derive(Debug)]
pub struct HandshakeResponse<'a> {
    pub result: Result<(), SignalRClientError>,
    /// Bytes following the handshake frame, already hub protocol data.
    pub remainder: &'a [u8],
}

/// Parses the handshake frame at the start of `input`.
///
/// Returns `None` until `input` holds a complete, record separator terminated
/// frame.
pub fn parse_response(input: &[u8]) -> Option<HandshakeResponse<'_>> {
    let end = input.iter().position(|b| *b == RECORD_SEPARATOR_BYTE)?;
    let frame = &input[..end];
    let remainder = &input[end + 1..];

    Some(HandshakeResponse {
        result: parse_frame(frame),
        remainder,
    })
}

fn parse_frame(frame: &[u8]) -> Result<(), SignalRClientError> {
    if frame == b"{}" {
        return Ok(());
    }

    let object = match serde_json::from_slice::<Value>(frame) {
        Ok(Value::Object(object)) => object,
        _ => return Err(invalid()),
    };

    if object.is_empty() {
        return Ok(());
    }

    match (object.len(), object.get("error")) {
        (1, Some(Value::String(message))) => Err(SignalRClientError::HandshakeError {
            message: message.clone(),
        }),
        _ => Err(invalid()),
    }
}

fn invalid() -> SignalRClientError {
    SignalRClientError::HandshakeError {
        message: INVALID_HANDSHAKE_RESPONSE.to_owned(),
    }
}
