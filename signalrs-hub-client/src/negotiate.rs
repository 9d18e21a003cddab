//! Negotiation with the hub server.
//!
//! Before a transport is started the client POSTs to `<hub url>/negotiate`.
//! The server answers either with a connection id and the transports it
//! offers, or with a redirect to another endpoint and an access token to use
//! there.

use crate::error::SignalRClientError;
use serde_json::{Map, Value};
use std::{fmt::Display, str::FromStr};
use url::Url;

pub const WEB_SOCKET_TRANSPORT: &str = "WebSockets";
pub const SERVER_SENT_EVENTS_TRANSPORT: &str = "ServerSentEvents";
pub const LONG_POLLING_TRANSPORT: &str = "LongPolling";
pub const TEXT_TRANSFER_FORMAT: &str = "Text";
pub const BINARY_TRANSFER_FORMAT: &str = "Binary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    WebSockets,
    ServerSentEvents,
    LongPolling,
}

/// Whether a transport carries text or binary frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferFormat {
    Text,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportDescription {
    pub transport_type: TransportType,
    pub transfer_formats: Vec<TransferFormat>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationResult {
    pub connection_id: String,
    pub available_transports: Vec<TransportDescription>,
}

/// Server asked the client to negotiate against another endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    pub url: String,
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationResponse {
    Negotiation(NegotiationResult),
    Redirection(Redirection),
}

impl NegotiationResult {
    pub fn supports(&self, transport_type: TransportType, format: TransferFormat) -> bool {
        self.available_transports
            .iter()
            .find(|t| t.transport_type == transport_type)
            .map(|t| t.transfer_formats.contains(&format))
            .unwrap_or(false)
    }
}

/// Parses the body of a negotiate response.
///
/// A `url` key marks a redirect. Every other body must carry a `connectionId`
/// and a non-empty `availableTransports` list. Errors name the offending field.
pub fn parse_negotiation_response(body: &[u8]) -> Result<NegotiationResponse, SignalRClientError> {
    let value: Value = serde_json::from_slice(body).map_err(|error| {
        SignalRClientError::invalid_negotiation(format!("response is not valid JSON: {error}"))
    })?;

    let object = value.as_object().ok_or_else(|| {
        SignalRClientError::invalid_negotiation("negotiation response is not a JSON object")
    })?;

    if object.contains_key("url") {
        return parse_redirection(object).map(NegotiationResponse::Redirection);
    }

    parse_negotiation(object).map(NegotiationResponse::Negotiation)
}

fn parse_redirection(object: &Map<String, Value>) -> Result<Redirection, SignalRClientError> {
    let url = required_string(object, "url")?;
    let access_token = required_string(object, "accessToken")?;

    Ok(Redirection { url, access_token })
}

fn parse_negotiation(object: &Map<String, Value>) -> Result<NegotiationResult, SignalRClientError> {
    let connection_id = required_string(object, "connectionId")?;

    let transports = object
        .get("availableTransports")
        .ok_or_else(|| SignalRClientError::invalid_negotiation("availableTransports is missing"))?
        .as_array()
        .ok_or_else(|| {
            SignalRClientError::invalid_negotiation("availableTransports is not an array")
        })?;

    if transports.is_empty() {
        return Err(SignalRClientError::invalid_negotiation(
            "availableTransports is empty",
        ));
    }

    let available_transports = transports
        .iter()
        .map(parse_transport_description)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NegotiationResult {
        connection_id,
        available_transports,
    })
}

fn parse_transport_description(value: &Value) -> Result<TransportDescription, SignalRClientError> {
    let object = value.as_object().ok_or_else(|| {
        SignalRClientError::invalid_negotiation("transport description is not a JSON object")
    })?;

    let transport_type = required_string(object, "transport")?.parse::<TransportType>()?;

    let formats = object
        .get("transferFormats")
        .ok_or_else(|| {
            SignalRClientError::invalid_negotiation(format!(
                "transferFormats missing for transport {transport_type}"
            ))
        })?
        .as_array()
        .ok_or_else(|| {
            SignalRClientError::invalid_negotiation(format!(
                "transferFormats for transport {transport_type} is not an array"
            ))
        })?;

    if formats.is_empty() {
        return Err(SignalRClientError::invalid_negotiation(format!(
            "transferFormats for transport {transport_type} is empty"
        )));
    }

    let transfer_formats = formats
        .iter()
        .map(|format| {
            format
                .as_str()
                .ok_or_else(|| {
                    SignalRClientError::invalid_negotiation(format!(
                        "transfer format of transport {transport_type} is not a string"
                    ))
                })
                .and_then(str::parse::<TransferFormat>)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TransportDescription {
        transport_type,
        transfer_formats,
    })
}

fn required_string(object: &Map<String, Value>, key: &str) -> Result<String, SignalRClientError> {
    match object.get(key) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(SignalRClientError::invalid_negotiation(format!(
            "{key} is not a string"
        ))),
        None => Err(SignalRClientError::invalid_negotiation(format!(
            "{key} is missing"
        ))),
    }
}

/// `<base>/negotiate`, keeping the base query string.
pub(crate) fn negotiate_url(base: &Url) -> Url {
    let mut url = base.clone();
    let mut path = url.path().to_string();
    if path.ends_with('/') {
        path.pop();
    }
    path.push_str("/negotiate");
    url.set_path(&path);
    url.set_fragment(None);
    url
}

/// Base url with the negotiated connection id appended as `id` query parameter.
pub(crate) fn start_url(base: &Url, connection_id: &str) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair("id", connection_id);
    url
}

impl FromStr for TransportType {
    type Err = SignalRClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            WEB_SOCKET_TRANSPORT => Ok(TransportType::WebSockets),
            SERVER_SENT_EVENTS_TRANSPORT => Ok(TransportType::ServerSentEvents),
            LONG_POLLING_TRANSPORT => Ok(TransportType::LongPolling),
            other => Err(SignalRClientError::invalid_negotiation(format!(
                "unknown transport {other}"
            ))),
        }
    }
}

impl FromStr for TransferFormat {
    type Err = SignalRClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            TEXT_TRANSFER_FORMAT => Ok(TransferFormat::Text),
            BINARY_TRANSFER_FORMAT => Ok(TransferFormat::Binary),
            other => Err(SignalRClientError::invalid_negotiation(format!(
                "unknown transfer format {other}"
            ))),
        }
    }
}

impl Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportType::WebSockets => write!(f, "{WEB_SOCKET_TRANSPORT}"),
            TransportType::ServerSentEvents => write!(f, "{SERVER_SENT_EVENTS_TRANSPORT}"),
            TransportType::LongPolling => write!(f, "{LONG_POLLING_TRANSPORT}"),
        }
    }
}

impl Display for TransferFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferFormat::Text => write!(f, "{TEXT_TRANSFER_FORMAT}"),
            TransferFormat::Binary => write!(f, "{BINARY_TRANSFER_FORMAT}"),
        }
    }
}
