use crate::{error::SignalRClientError, protocol::TypeConverter};
use serde_json::Value;
use std::sync::Arc;

/// Server-to-client invocation being unpacked into handler arguments.
pub struct HubInvocation {
    target: String,
    arguments: std::vec::IntoIter<Value>,
    converter: Arc<dyn TypeConverter>,
}

impl HubInvocation {
    pub(crate) fn new(
        target: impl Into<String>,
        arguments: Vec<Value>,
        converter: Arc<dyn TypeConverter>,
    ) -> Self {
        HubInvocation {
            target: target.into(),
            arguments: arguments.into_iter(),
            converter,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub(crate) fn next_argument(&mut self) -> Result<Value, SignalRClientError> {
        self.arguments.next().ok_or_else(|| {
            SignalRClientError::invalid_message(format!(
                "invocation of {} has fewer arguments than its handler",
                self.target
            ))
        })
    }

    pub(crate) fn remaining_arguments(&mut self) -> Vec<Value> {
        self.arguments.by_ref().collect()
    }

    pub(crate) fn converter(&self) -> Arc<dyn TypeConverter> {
        self.converter.clone()
    }
}

/// Extracts a handler argument from an invocation.
pub trait FromInvocation
where
    Self: Sized,
{
    fn try_from_invocation(request: &mut HubInvocation) -> Result<Self, SignalRClientError>;
}
