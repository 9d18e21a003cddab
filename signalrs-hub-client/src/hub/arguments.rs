use super::invocation::{FromInvocation, HubInvocation};
use crate::{error::SignalRClientError, protocol::TypeConverter};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Represents an argument of a client-side hub method.
///
/// Implemented for primitives out of the box. Implement it for your own
/// [`Deserialize`](serde::Deserialize) types to accept them in handlers.
///
/// # Example
/// ```rust,no_run
/// use serde::Deserialize;
/// use signalrs_hub_client::HubArgument;
///
/// #[derive(Deserialize)]
/// struct Data {
///     f1: i32,
///     f2: String
/// }
///
/// impl HubArgument for Data {}
/// ```
pub trait HubArgument {}

impl<T> FromInvocation for T
where
    T: HubArgument + DeserializeOwned,
{
    fn try_from_invocation(request: &mut HubInvocation) -> Result<Self, SignalRClientError> {
        let next = request.next_argument()?;
        request.converter().convert_from_wire(next)
    }
}

/// All arguments of an invocation that were not extracted by preceding parameters.
///
/// Useful when the number or the types of arguments are not known upfront.
pub struct HubArguments {
    values: Vec<Value>,
    converter: Arc<dyn TypeConverter>,
}

impl HubArguments {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Converts the argument at `index` to `T`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, SignalRClientError> {
        let value = self.values.get(index).cloned().ok_or_else(|| {
            SignalRClientError::invalid_operation(format!(
                "argument {index} requested, but only {} available",
                self.values.len()
            ))
        })?;

        self.converter.convert_from_wire(value)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl FromInvocation for HubArguments {
    fn try_from_invocation(request: &mut HubInvocation) -> Result<Self, SignalRClientError> {
        Ok(HubArguments {
            values: request.remaining_arguments(),
            converter: request.converter(),
        })
    }
}

macro_rules! impl_hub_argument {
    ($($ty:ty),+) => {
        $(
            impl HubArgument for $ty {}
        )+
    };
}

impl_hub_argument!(usize, isize);
impl_hub_argument!(f32, f64);
impl_hub_argument!(i8, i16, i32, i64, i128);
impl_hub_argument!(u8, u16, u32, u64, u128);
impl_hub_argument!(bool, char, String);
impl_hub_argument!(Value);

impl<T: HubArgument> HubArgument for Vec<T> {}
impl<T: HubArgument> HubArgument for Option<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::JsonTypeConverter;
    use serde_json::json;

    fn invocation(arguments: Vec<Value>) -> HubInvocation {
        HubInvocation::new("Target", arguments, Arc::new(JsonTypeConverter))
    }

    #[test]
    fn extracts_in_order() {
        let mut request = invocation(vec![json!(1), json!("two"), json!([3, 4])]);

        let first = i32::try_from_invocation(&mut request).unwrap();
        let second = String::try_from_invocation(&mut request).unwrap();
        let third = Vec::<u8>::try_from_invocation(&mut request).unwrap();

        assert_eq!(1, first);
        assert_eq!("two", second);
        assert_eq!(vec![3, 4], third);
    }

    #[test]
    fn missing_argument_is_an_error() {
        let mut request = invocation(vec![]);

        let result = i32::try_from_invocation(&mut request);

        assert!(matches!(result, Err(SignalRClientError::InvalidMessage { .. })));
    }

    #[test]
    fn wrong_type_is_unsupported() {
        let mut request = invocation(vec![json!("text")]);

        let result = i32::try_from_invocation(&mut request);

        assert!(matches!(result, Err(SignalRClientError::UnsupportedType { .. })));
    }

    #[test]
    fn raw_arguments_take_the_rest() {
        let mut request = invocation(vec![json!("user"), json!(1), json!(null)]);

        let _ = String::try_from_invocation(&mut request).unwrap();
        let rest = HubArguments::try_from_invocation(&mut request).unwrap();

        assert_eq!(2, rest.len());
        assert_eq!(1, rest.get::<i64>(0).unwrap());
        assert_eq!(None, rest.get::<Option<i64>>(1).unwrap());
        assert!(rest.get::<i64>(2).is_err());
    }
}
