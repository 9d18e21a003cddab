//! Hub method invocation builder

use crate::{
    error::SignalRClientError,
    hub::{HubConnection, HubStream},
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Request builder for the [`HubConnection`]
///
/// Collects arguments and then sends the invocation in one of the supported ways.
pub struct InvocationBuilder<'a> {
    hub: &'a HubConnection,
    method: String,
    arguments: Vec<Value>,
}

impl<'a> InvocationBuilder<'a> {
    pub(crate) fn new(hub: &'a HubConnection, method: impl ToString) -> Self {
        InvocationBuilder {
            hub,
            method: method.to_string(),
            arguments: Default::default(),
        }
    }

    /// Adds ordered argument to invocation
    ///
    /// Order of arguments matters, they need to be passed in exactly the same order server expects them.
    ///
    /// # Example
    ///
    /// Assuming server has a hub method defined as:
    /// ```csharp
    /// public int Add(int a, int b) => a + b;
    /// ```
    ///
    /// Invocation would have to be built in a following way to call this method
    /// ```rust,no_run
    /// use signalrs_hub_client::HubConnection;
    ///
    /// # async fn function(hub: HubConnection) -> anyhow::Result<()> {
    /// let result = hub.method("Add")
    ///     .arg(2)?
    ///     .arg(3)?
    ///     .invoke::<i32>()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn arg<A>(mut self, arg: A) -> Result<Self, SignalRClientError>
    where
        A: Serialize,
    {
        let value = self
            .hub
            .type_converter()
            .convert_to_wire(&arg)?;
        self.arguments.push(value);

        Ok(self)
    }

    /// Sends an invocation to the server and does not expect any response
    ///
    /// This method follows 'fire and forget' semantics.
    /// As soon as the message is sent from the client it returns to the caller.
    pub async fn send(self) -> Result<(), SignalRClientError> {
        self.hub.send(self.method, self.arguments).await
    }

    /// Sends an invocation to the server and awaits unit response
    ///
    /// It follows semantics such as `void` methods. A result sent by the server is ignored.
    pub async fn invoke_unit(self) -> Result<(), SignalRClientError> {
        self.hub.invoke(self.method, self.arguments).await?;

        Ok(())
    }

    /// Sends an invocation to the server and awaits meaningful, single response
    ///
    /// # Important
    ///
    /// This function fails if the server completes the invocation without a result.
    /// Use [`invoke_unit`](InvocationBuilder::invoke_unit) for methods that return nothing.
    pub async fn invoke<T: DeserializeOwned>(self) -> Result<T, SignalRClientError> {
        let converter = self.hub.type_converter();

        let result = self
            .hub
            .invoke(self.method, self.arguments)
            .await?
            .ok_or_else(|| {
                SignalRClientError::invalid_message("expected some result, received empty")
            })?;

        converter.convert_from_wire(result)
    }

    /// Sends an invocation to the server and awaits meaningful stream of responses
    ///
    /// # Example
    /// ```rust,no_run
    /// use futures::StreamExt;
    /// use signalrs_hub_client::HubConnection;
    ///
    /// # async fn function(hub: HubConnection) -> anyhow::Result<()> {
    /// let mut numbers = hub.method("Counter")
    ///     .arg(5)?
    ///     .stream::<usize>()
    ///     .await;
    ///
    /// while let Some(number) = numbers.next().await {
    ///     println!("next number: {}", number?);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn stream<T>(self) -> HubStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.hub.stream(self.method, self.arguments).await
    }
}
