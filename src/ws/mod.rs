//! Self-healing WebSocket event stream.
//!
//! # Architecture
//!
//! - [`Supervisor`]: reconnect loop, authentication after every (re)connect, shutdown
//! - [`Transport`] / [`Connection`]: the streaming connection with heartbeat and idle timeout,
//!   implemented by [`TungsteniteTransport`]
//! - [`Dispatch`]: the consumer of inbound messages
//!
//! # Example
//!
//! ```ignore
//! let supervisor = Supervisor::new(&options, token, Config::default())?;
//! supervisor.connect(|event: String| async move { handle(event).await }).await;
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod supervisor;
pub mod traits;
pub mod transport;

#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use supervisor::{Supervisor, SupervisorState};
pub use traits::*;
pub use transport::{TungsteniteConnection, TungsteniteTransport};
