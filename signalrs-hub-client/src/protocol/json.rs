use super::{
    converter::{JsonTypeConverter, TypeConverter},
    messages::{
        CancelInvocation, Close, Completion, HubMessage, Invocation, MessageType, StreamInvocation,
        StreamItem,
    },
    HubProtocol, ParsedMessages,
};
use crate::{
    error::SignalRClientError,
    messages::{self, Payload, RECORD_SEPARATOR_BYTE},
    negotiate::TransferFormat,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub const JSON_PROTOCOL_NAME: &str = "json";
pub const JSON_PROTOCOL_VERSION: u32 = 1;

/// Text hub protocol: one JSON object per frame, each terminated by `0x1E`.
#[derive(Clone)]
pub struct JsonHubProtocol {
    type_converter: Arc<dyn TypeConverter>,
}

#[derive(Serialize)]
struct Tagged<'a, T> {
    r#type: MessageType,
    #[serde(flatten)]
    message: &'a T,
}

impl JsonHubProtocol {
    pub fn new() -> Self {
        Self::with_type_converter(Arc::new(JsonTypeConverter))
    }

    pub fn with_type_converter(type_converter: Arc<dyn TypeConverter>) -> Self {
        JsonHubProtocol { type_converter }
    }

    /// Decodes a single frame, without its record separator.
    pub fn parse_message(&self, frame: &[u8]) -> Result<HubMessage, SignalRClientError> {
        let value: Value = serde_json::from_slice(frame)
            .map_err(|error| SignalRClientError::invalid_message(error.to_string()))?;

        let message_type = value
            .get("type")
            .and_then(Value::as_u64)
            .ok_or_else(|| SignalRClientError::invalid_message("missing integer type field"))?;

        let message = match MessageType::try_from(message_type)? {
            MessageType::Invocation => HubMessage::Invocation(from_value::<Invocation>(value)?),
            MessageType::StreamItem => HubMessage::StreamItem(from_value::<StreamItem>(value)?),
            MessageType::Completion => {
                let completion = from_value::<Completion>(value)?;
                completion.validate()?;
                HubMessage::Completion(completion)
            }
            MessageType::StreamInvocation => {
                HubMessage::StreamInvocation(from_value::<StreamInvocation>(value)?)
            }
            MessageType::CancelInvocation => {
                HubMessage::CancelInvocation(from_value::<CancelInvocation>(value)?)
            }
            MessageType::Ping => HubMessage::Ping,
            MessageType::Close => HubMessage::Close(from_value::<Close>(value)?),
        };

        Ok(message)
    }
}

impl Default for JsonHubProtocol {
    fn default() -> Self {
        JsonHubProtocol::new()
    }
}

impl HubProtocol for JsonHubProtocol {
    fn name(&self) -> &str {
        JSON_PROTOCOL_NAME
    }

    fn version(&self) -> u32 {
        JSON_PROTOCOL_VERSION
    }

    fn transfer_format(&self) -> TransferFormat {
        TransferFormat::Text
    }

    fn type_converter(&self) -> Arc<dyn TypeConverter> {
        self.type_converter.clone()
    }

    fn parse_messages(&self, input: &[u8]) -> ParsedMessages {
        let last_separator = match input.iter().rposition(|b| *b == RECORD_SEPARATOR_BYTE) {
            Some(position) => position,
            None => return ParsedMessages::default(),
        };

        let messages = input[..last_separator]
            .split(|b| *b == RECORD_SEPARATOR_BYTE)
            .filter(|frame| !frame.iter().all(u8::is_ascii_whitespace))
            .map(|frame| self.parse_message(frame))
            .collect();

        ParsedMessages {
            messages,
            consumed: last_separator + 1,
        }
    }

    fn write_message(&self, message: &HubMessage) -> Result<Payload, SignalRClientError> {
        let message_type = message.message_type();

        let text = match message {
            HubMessage::Invocation(m) => tagged(message_type, m),
            HubMessage::StreamItem(m) => tagged(message_type, m),
            HubMessage::Completion(m) => tagged(message_type, m),
            HubMessage::StreamInvocation(m) => tagged(message_type, m),
            HubMessage::CancelInvocation(m) => tagged(message_type, m),
            HubMessage::Ping => messages::to_json(&serde_json::json!({ "type": message_type })),
            HubMessage::Close(m) => tagged(message_type, m),
        }?;

        Ok(Payload::Text(text))
    }
}

fn tagged<T: Serialize>(r#type: MessageType, message: &T) -> Result<String, serde_json::Error> {
    messages::to_json(&Tagged { r#type, message })
}

fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, SignalRClientError> {
    serde_json::from_value(value).map_err(|error| SignalRClientError::invalid_message(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame_json(payload: Payload) -> Value {
        let text = match payload {
            Payload::Text(text) => text,
            other => panic!("expected text payload, got {other:?}"),
        };
        let stripped = text
            .strip_suffix(messages::RECORD_SEPARATOR)
            .expect("frame is not terminated");
        serde_json::from_str(stripped).unwrap()
    }

    #[test]
    fn invocation_round_trip() {
        let protocol = JsonHubProtocol::new();
        let message = HubMessage::Invocation(Invocation::non_blocking(
            "Foo",
            vec![json!(1), json!("a")],
        ));

        let payload = protocol.write_message(&message).unwrap();
        let parsed = protocol.parse_messages(payload.as_bytes());

        assert_eq!(payload.len(), parsed.consumed);
        assert_eq!(1, parsed.messages.len());
        assert_eq!(&message, parsed.messages[0].as_ref().unwrap());
    }

    #[test]
    fn writes_invocation_without_id() {
        let protocol = JsonHubProtocol::new();
        let message = HubMessage::Invocation(Invocation::non_blocking("fun", vec![json!(1)]));

        let actual = frame_json(protocol.write_message(&message).unwrap());

        assert_eq!(json!({"type": 1, "target": "fun", "arguments": [1]}), actual);
    }

    #[test]
    fn writes_stream_invocation_and_cancel() {
        let protocol = JsonHubProtocol::new();

        let stream = HubMessage::StreamInvocation(StreamInvocation::new("7", "Nums", vec![json!(1)]));
        let cancel = HubMessage::CancelInvocation(CancelInvocation {
            invocation_id: "7".into(),
        });

        assert_eq!(
            json!({"type": 4, "invocationId": "7", "target": "Nums", "arguments": [1]}),
            frame_json(protocol.write_message(&stream).unwrap())
        );
        assert_eq!(
            json!({"type": 5, "invocationId": "7"}),
            frame_json(protocol.write_message(&cancel).unwrap())
        );
        assert_eq!(
            json!({"type": 6}),
            frame_json(protocol.write_message(&HubMessage::Ping).unwrap())
        );
    }

    #[test]
    fn distinguishes_null_result_from_void_completion() {
        let protocol = JsonHubProtocol::new();

        let with_null = protocol
            .parse_message(br#"{"type":3,"invocationId":"1","result":null}"#)
            .unwrap();
        let void = protocol
            .parse_message(br#"{"type":3,"invocationId":"1"}"#)
            .unwrap();

        assert_eq!(
            HubMessage::Completion(Completion::with_result("1", Value::Null)),
            with_null
        );
        assert_eq!(HubMessage::Completion(Completion::ok("1")), void);
    }

    #[test]
    fn completion_with_result_and_error_is_invalid() {
        let protocol = JsonHubProtocol::new();

        let result = protocol.parse_message(br#"{"type":3,"invocationId":"1","result":1,"error":"e"}"#);

        assert!(matches!(result, Err(SignalRClientError::InvalidMessage { .. })));
    }

    #[test]
    fn malformed_message_does_not_poison_siblings() {
        let protocol = JsonHubProtocol::new();
        let input = "{\"type\":6}\u{1e}{garbage\u{1e}{\"type\":42}\u{1e}{\"type\":7,\"error\":\"bye\"}\u{1e}";

        let parsed = protocol.parse_messages(input.as_bytes());

        assert_eq!(4, parsed.messages.len());
        assert_eq!(&HubMessage::Ping, parsed.messages[0].as_ref().unwrap());
        assert!(matches!(
            parsed.messages[1],
            Err(SignalRClientError::InvalidMessage { .. })
        ));
        assert!(matches!(
            parsed.messages[2],
            Err(SignalRClientError::UnknownMessageType { message_type: 42 })
        ));
        assert_eq!(
            &HubMessage::Close(Close {
                error: Some("bye".into()),
                allow_reconnect: None
            }),
            parsed.messages[3].as_ref().unwrap()
        );
    }

    #[test]
    fn leaves_partial_frame_unconsumed() {
        let protocol = JsonHubProtocol::new();
        let input = b"{\"type\":6}\x1e{\"type\":2,\"invoc";

        let parsed = protocol.parse_messages(input);

        assert_eq!(1, parsed.messages.len());
        assert_eq!(11, parsed.consumed);
    }

    #[test]
    fn nothing_to_parse_without_separator() {
        let parsed = JsonHubProtocol::new().parse_messages(b"{\"type\":6}");

        assert!(parsed.messages.is_empty());
        assert_eq!(0, parsed.consumed);
    }
}
