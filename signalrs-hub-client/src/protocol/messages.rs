use crate::error::SignalRClientError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::fmt::Display;

/// Messages exchanged with a hub after the handshake.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Invocation(Invocation),
    StreamItem(StreamItem),
    Completion(Completion),
    StreamInvocation(StreamInvocation),
    CancelInvocation(CancelInvocation),
    Ping,
    Close(Close),
}

impl HubMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            HubMessage::Invocation(_) => MessageType::Invocation,
            HubMessage::StreamItem(_) => MessageType::StreamItem,
            HubMessage::Completion(_) => MessageType::Completion,
            HubMessage::StreamInvocation(_) => MessageType::StreamInvocation,
            HubMessage::CancelInvocation(_) => MessageType::CancelInvocation,
            HubMessage::Ping => MessageType::Ping,
            HubMessage::Close(_) => MessageType::Close,
        }
    }
}

/// Indicates a request to invoke a particular method (the Target) with provided Arguments on the remote endpoint.
///
/// Without an invocation id the sender does not expect a completion.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    pub target: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl Invocation {
    pub fn non_blocking(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        Invocation {
            invocation_id: None,
            target: target.into(),
            arguments,
        }
    }

    pub fn with_id(
        invocation_id: impl Into<String>,
        target: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        Invocation {
            invocation_id: Some(invocation_id.into()),
            target: target.into(),
            arguments,
        }
    }
}

/// Indicates individual items of streamed response data from a previous `StreamInvocation` message.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamItem {
    pub invocation_id: String,
    pub item: Value,
}

impl StreamItem {
    pub fn new(invocation_id: impl Into<String>, item: Value) -> Self {
        StreamItem {
            invocation_id: invocation_id.into(),
            item,
        }
    }
}

/// Indicates a previous Invocation or StreamInvocation has completed.
/// Contains an error if the invocation concluded with an error or the result of a non-streaming method invocation.
/// The result will be absent for void methods.
/// In case of streaming invocations no further StreamItem messages will be received.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub invocation_id: String,
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Completion {
    pub fn ok(invocation_id: impl Into<String>) -> Self {
        Self::new(invocation_id, None, None)
    }

    pub fn with_result(invocation_id: impl Into<String>, result: Value) -> Self {
        Self::new(invocation_id, Some(result), None)
    }

    pub fn error(invocation_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(invocation_id, None, Some(error.into()))
    }

    pub fn new(invocation_id: impl Into<String>, result: Option<Value>, error: Option<String>) -> Self {
        Completion {
            invocation_id: invocation_id.into(),
            result,
            error,
        }
    }

    /// `true` when a `result` key was present, even if its value was `null`.
    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub(crate) fn validate(&self) -> Result<(), SignalRClientError> {
        if self.has_result() && self.is_error() {
            return Err(SignalRClientError::invalid_message(
                "completion carries both a result and an error",
            ));
        }
        Ok(())
    }
}

/// Indicates a request to invoke a streaming method (the Target) with provided Arguments on the remote endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamInvocation {
    pub invocation_id: String,
    pub target: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl StreamInvocation {
    pub fn new(
        invocation_id: impl Into<String>,
        target: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        StreamInvocation {
            invocation_id: invocation_id.into(),
            target: target.into(),
            arguments,
        }
    }
}

/// Sent by the client to cancel a streaming invocation on the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CancelInvocation {
    pub invocation_id: String,
}

/// Sent by the server when a connection is closed. Contains an error if the connection was closed because of an error.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Close {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_reconnect: Option<bool>,
}

#[derive(Debug, Serialize_repr, Deserialize_repr, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Invocation = 1,
    StreamItem = 2,
    Completion = 3,
    StreamInvocation = 4,
    CancelInvocation = 5,
    Ping = 6,
    Close = 7,
}

impl Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Invocation => write!(f, "{}", stringify!(MessageType::Invocation)),
            MessageType::StreamItem => write!(f, "{}", stringify!(MessageType::StreamItem)),
            MessageType::Completion => write!(f, "{}", stringify!(MessageType::Completion)),
            MessageType::StreamInvocation => {
                write!(f, "{}", stringify!(MessageType::StreamInvocation))
            }
            MessageType::CancelInvocation => {
                write!(f, "{}", stringify!(MessageType::CancelInvocation))
            }
            MessageType::Ping => write!(f, "{}", stringify!(MessageType::Ping)),
            MessageType::Close => write!(f, "{}", stringify!(MessageType::Close)),
        }
    }
}

impl TryFrom<u64> for MessageType {
    type Error = SignalRClientError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::Invocation),
            2 => Ok(MessageType::StreamItem),
            3 => Ok(MessageType::Completion),
            4 => Ok(MessageType::StreamInvocation),
            5 => Ok(MessageType::CancelInvocation),
            6 => Ok(MessageType::Ping),
            7 => Ok(MessageType::Close),
            message_type => Err(SignalRClientError::UnknownMessageType { message_type }),
        }
    }
}

// `"result": null` must stay distinguishable from a missing `result`
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
