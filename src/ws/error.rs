#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// Boxed error produced by transports and dispatchers.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Why a single connection attempt ended.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Could not establish the connection (DNS, refused, TLS, protocol upgrade rejected)
    Connect(BoxError),
    /// The authentication challenge could not be sent
    Handshake(Box<WsError>),
    /// No frame arrived within the idle-receive timeout
    Timeout,
    /// A PING was not answered within the heartbeat timeout
    HeartbeatTimeout,
    /// The connection broke while streaming
    Transport(BoxError),
    /// The dispatcher rejected a message
    Dispatch(BoxError),
    /// Tried to use a connection that is already closed
    ConnectionClosed,
}

impl WsError {
    pub fn connect<E: Into<BoxError>>(source: E) -> Self {
        Self::Connect(source.into())
    }

    pub fn transport<E: Into<BoxError>>(source: E) -> Self {
        Self::Transport(source.into())
    }

    /// Coarse classification used in logs and retry decisions.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Connect(_) => FailureKind::Connect,
            Self::Handshake(_) => FailureKind::Handshake,
            Self::Timeout => FailureKind::IdleTimeout,
            Self::HeartbeatTimeout => FailureKind::Heartbeat,
            Self::Transport(_) | Self::ConnectionClosed => FailureKind::Transport,
            Self::Dispatch(_) => FailureKind::Dispatch,
        }
    }
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(e) => write!(f, "WebSocket connection error: {e}"),
            Self::Handshake(e) => write!(f, "Failed to send authentication challenge: {e}"),
            Self::Timeout => write!(f, "No WebSocket frame received before the idle timeout"),
            Self::HeartbeatTimeout => write!(f, "WebSocket heartbeat was not answered in time"),
            Self::Transport(e) => write!(f, "WebSocket transport error: {e}"),
            Self::Dispatch(e) => write!(f, "Event dispatch failed: {e}"),
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connect(e) | Self::Transport(e) | Self::Dispatch(e) => Some(&**e),
            Self::Handshake(e) => Some(&**e),
            _ => None,
        }
    }
}

/// Failure taxonomy of a connection attempt.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    Connect,
    Handshake,
    IdleTimeout,
    Heartbeat,
    Transport,
    Dispatch,
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for WsError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as TungsteniteError;

        match e {
            TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed => {
                Self::ConnectionClosed
            }
            other => Self::Transport(Box::new(other)),
        }
    }
}
