//! Core traits at the seams of the supervisor.
//!
//! - [`Transport`] / [`Connection`]: the streaming connection, with liveness built in
//! - [`Dispatch`]: the consumer of inbound messages

use std::future::Future;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::config::TransportSettings;
use super::error::{BoxError, WsError};

/// Opens streaming connections.
///
/// Implementations must enforce [`TransportSettings::receive_timeout`] and the heartbeat
/// settings inside [`Connection::recv`]; the supervisor relies on them to notice dead peers.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;

    /// Establish a connection to `url`.
    ///
    /// Fails with [`WsError::Connect`] when the endpoint is unreachable, TLS verification fails
    /// or the protocol handshake is rejected.
    async fn open(&self, url: &str, settings: &TransportSettings)
    -> Result<Self::Connection, WsError>;
}

/// One open connection. Owned exclusively by a single supervisor attempt.
#[async_trait]
pub trait Connection: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), WsError>;

    /// Wait for the next inbound text frame.
    ///
    /// Returns `None` once the remote closed the connection cleanly, and an error on idle
    /// timeout, missed heartbeat or a broken connection.
    async fn recv(&mut self) -> Option<Result<String, WsError>>;

    /// Release the connection. Calling it more than once is a no-op.
    async fn close(&mut self);
}

/// Consumer of inbound messages.
///
/// Messages arrive one at a time, in order; the next one is not read until `dispatch` returns.
/// Returning an error tears the connection down and reconnects.
///
/// Implemented for async closures:
///
/// ```
/// use mattermost_websocket::ws::Dispatch;
///
/// fn assert_dispatch<D: Dispatch>(_: D) {}
///
/// assert_dispatch(|message: String| async move {
///     if message.is_empty() {
///         return Err("empty frame");
///     }
///     Ok(())
/// });
/// ```
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, message: String) -> Result<(), BoxError>;
}

#[async_trait]
impl<F, Fut, E> Dispatch for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    async fn dispatch(&self, message: String) -> Result<(), BoxError> {
        self(message).await.map_err(Into::into)
    }
}

/// Channel delivery: messages are queued for a separate worker. A full channel stalls the
/// receive loop; a dropped receiver fails dispatch.
#[async_trait]
impl Dispatch for mpsc::Sender<String> {
    async fn dispatch(&self, message: String) -> Result<(), BoxError> {
        self.send(message).await.map_err(Into::into)
    }
}
