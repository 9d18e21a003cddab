#![deny(unsafe_code)]

//! SignalR hub client.
//!
//! A [`HubConnection`] negotiates with the server, opens a transport, performs
//! the hub handshake and then lets the application invoke hub methods, consume
//! server streams and handle methods invoked by the server.

mod builder;
mod callback_queue;
pub mod config;
pub mod connection;
mod error;
pub mod http;
mod hub;
mod invocation;
pub mod messages;
pub mod negotiate;
pub mod protocol;
pub mod transport;

pub use self::{
    builder::{BuilderError, HubConnectionBuilder},
    callback_queue::CallbackQueue,
    config::Auth,
    error::SignalRClientError,
    hub::{
        FromInvocation, Handler, HubArgument, HubArguments, HubConnection, HubConnectionDelegate,
        HubInvocation, HubStream, StreamHandle,
    },
    invocation::InvocationBuilder,
};
