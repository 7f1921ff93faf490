use std::sync::Arc;
use std::time::Instant;

use backoff::backoff::Backoff as _;
use tokio::sync::{Mutex, watch};
use tokio::time::sleep;

use super::auth::authenticate;
use super::config::{Config, ConnectionOptions, ReconnectConfig, TransportSettings};
use super::error::WsError;
use super::traits::{Connection, Dispatch, Transport};
use super::transport::TungsteniteTransport;
use crate::Result;
use crate::auth::Token;
use crate::error::Error;

/// Lifecycle of a [`Supervisor`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// `connect` is not running
    Idle,
    /// Opening the transport
    Connecting,
    /// Sending the authentication challenge
    Authenticating,
    /// Forwarding messages to the dispatcher
    Streaming {
        /// When the authentication challenge went out
        since: Instant,
    },
    /// Waiting before the next attempt
    Reconnecting {
        /// Consecutive failed attempts so far
        attempt: u32,
    },
    /// `disconnect` was called; the loop is winding down
    ShuttingDown,
}

impl SupervisorState {
    #[must_use]
    pub const fn is_streaming(self) -> bool {
        matches!(self, Self::Streaming { .. })
    }

    #[must_use]
    pub const fn is_shutting_down(self) -> bool {
        matches!(self, Self::ShuttingDown)
    }

    /// Whether a `connect` loop is active and has not been asked to stop.
    #[must_use]
    pub const fn is_running(self) -> bool {
        !matches!(self, Self::Idle | Self::ShuttingDown)
    }
}

/// How a single connection attempt ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// The server ended the stream
    Closed,
    /// `disconnect` was observed
    Shutdown,
}

struct Attempt {
    /// At least one message arrived on this connection
    delivered: bool,
    result: std::result::Result<Exit, WsError>,
}

impl Attempt {
    fn ended(result: std::result::Result<Exit, WsError>) -> Self {
        Self {
            delivered: false,
            result,
        }
    }
}

/// Keeps one authenticated event stream alive and feeds it to a [`Dispatch`].
///
/// Every attempt opens the transport, sends the authentication challenge and forwards inbound
/// messages, in order, one at a time. Any failure, and a clean close by the server, leads to a
/// delay and a fresh attempt. Only [`Supervisor::disconnect`] stops the loop (or, when
/// configured, [`ReconnectConfig::max_attempts`]).
///
/// Cloning is cheap; clones drive and observe the same loop.
///
/// # Example
///
/// ```rust, no_run
/// use mattermost_websocket::auth::Token;
/// use mattermost_websocket::ws::Supervisor;
/// use mattermost_websocket::ws::config::{Config, ConnectionOptions};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let options = ConnectionOptions::builder()
///         .host("chat.example.com")
///         .port(443)
///         .base_path("/api/v4")
///         .build();
///     let supervisor = Supervisor::new(&options, Token::new("token"), Config::default())?;
///
///     let handle = supervisor.clone();
///     tokio::spawn(async move {
///         tokio::signal::ctrl_c().await.ok();
///         handle.disconnect();
///     });
///
///     supervisor
///         .connect(|event: String| async move {
///             println!("{event}");
///             Ok::<_, std::io::Error>(())
///         })
///         .await;
///
///     Ok(())
/// }
/// ```
pub struct Supervisor<T: Transport = TungsteniteTransport> {
    inner: Arc<SupervisorInner<T>>,
}

impl<T: Transport> Clone for Supervisor<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct SupervisorInner<T> {
    /// `wss://{host}:{port}{base_path}/websocket`
    url: String,
    /// Liveness parameters handed to every connection
    settings: TransportSettings,
    reconnect: ReconnectConfig,
    token: Token,
    transport: T,
    /// Current state; also the shutdown signal
    state_tx: watch::Sender<SupervisorState>,
    /// Held for the duration of `connect` so only one connection exists at a time
    active: Mutex<()>,
}

impl Supervisor<TungsteniteTransport> {
    /// Create a supervisor that connects with [`TungsteniteTransport`].
    pub fn new(options: &ConnectionOptions, token: Token, config: Config) -> Result<Self> {
        Self::with_transport(options, token, config, TungsteniteTransport)
    }
}

impl<T: Transport> Supervisor<T> {
    /// Create a supervisor on top of a custom [`Transport`].
    ///
    /// Fails if `options` do not form a valid URL or `max_attempts` is zero.
    pub fn with_transport(
        options: &ConnectionOptions,
        token: Token,
        config: Config,
        transport: T,
    ) -> Result<Self> {
        let url = options.url()?;
        if config.reconnect.max_attempts == Some(0) {
            return Err(Error::validation("max_attempts must be at least 1"));
        }
        let (state_tx, _) = watch::channel(SupervisorState::Idle);

        Ok(Self {
            inner: Arc::new(SupervisorInner {
                url,
                settings: TransportSettings::new(&config, options.verify_tls),
                reconnect: config.reconnect,
                token,
                transport,
                state_tx,
                active: Mutex::new(()),
            }),
        })
    }

    /// The URL every attempt connects to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to state changes.
    ///
    /// Failures are otherwise only visible in logs; this is the way to observe reconnects.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<SupervisorState> {
        self.inner.state_tx.subscribe()
    }

    /// Ask the running [`Self::connect`] loop to stop.
    ///
    /// Returns immediately. A pending open, receive or retry delay is interrupted, the active
    /// connection is closed and no message is dispatched afterwards; a dispatch already in
    /// progress runs to completion.
    ///
    /// Only a loop that is already running is affected. The request is not remembered: calling
    /// this while the supervisor is [`SupervisorState::Idle`] (including right after spawning a
    /// `connect` that has not started yet) does nothing, and a `connect` still waiting for a
    /// previous one to finish is not stopped either.
    pub fn disconnect(&self) {
        #[cfg(feature = "tracing")]
        tracing::info!("Disconnecting websocket");

        self.inner.state_tx.send_if_modified(|state| {
            if *state == SupervisorState::Idle || state.is_shutting_down() {
                return false;
            }
            *state = SupervisorState::ShuttingDown;
            true
        });
    }

    /// Run the reconnect loop until [`Self::disconnect`] is called.
    ///
    /// Nothing is returned: failures are logged and retried. If another `connect` on this
    /// supervisor is running, this call waits for it to finish first, then starts a fresh loop
    /// that only a later [`Self::disconnect`] ends.
    pub async fn connect<D: Dispatch>(&self, dispatch: D) {
        let _active = self.inner.active.lock().await;

        self.inner.state_tx.send_replace(SupervisorState::Connecting);
        let mut shutdown = self.inner.state_tx.subscribe();
        let mut backoff = self.inner.reconnect.strategy.backoff();
        let mut failures = 0_u32;

        while self.transition(SupervisorState::Connecting) {
            let attempt = self.attempt(&dispatch, &mut shutdown).await;

            if attempt.delivered {
                failures = 0;
                backoff.reset();
            }

            match attempt.result {
                Ok(Exit::Shutdown) => break,
                Ok(Exit::Closed) => {
                    #[cfg(feature = "tracing")]
                    tracing::info!("WebSocket stream ended by the server");
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    log_failure(&e, failures);
                }
            }

            // Check if we should stop reconnecting
            if let Some(max) = self.inner.reconnect.max_attempts
                && failures >= max
            {
                #[cfg(feature = "tracing")]
                tracing::error!("Giving up after {failures} failed WebSocket connection attempts");
                break;
            }

            if !self.transition(SupervisorState::Reconnecting { attempt: failures }) {
                break;
            }

            if let Some(delay) = backoff.next_backoff() {
                #[cfg(feature = "tracing")]
                tracing::debug!("Reconnecting in {delay:?}");

                tokio::select! {
                    biased;
                    () = shutdown_requested(&mut shutdown) => break,
                    () = sleep(delay) => {}
                }
            }
        }

        self.inner.state_tx.send_replace(SupervisorState::Idle);
    }

    /// One open → authenticate → stream cycle. The connection is closed before returning.
    async fn attempt<D: Dispatch>(
        &self,
        dispatch: &D,
        shutdown: &mut watch::Receiver<SupervisorState>,
    ) -> Attempt {
        let inner = &self.inner;

        let mut connection = tokio::select! {
            biased;
            () = shutdown_requested(shutdown) => return Attempt::ended(Ok(Exit::Shutdown)),
            opened = inner.transport.open(&inner.url, &inner.settings) => match opened {
                Ok(connection) => connection,
                Err(e) => return Attempt::ended(Err(e)),
            },
        };

        let mut delivered = false;
        let result = self
            .stream(&mut connection, dispatch, shutdown, &mut delivered)
            .await;
        connection.close().await;

        Attempt { delivered, result }
    }

    async fn stream<C: Connection, D: Dispatch>(
        &self,
        connection: &mut C,
        dispatch: &D,
        shutdown: &mut watch::Receiver<SupervisorState>,
        delivered: &mut bool,
    ) -> std::result::Result<Exit, WsError> {
        if !self.transition(SupervisorState::Authenticating) {
            return Ok(Exit::Shutdown);
        }

        tokio::select! {
            biased;
            () = shutdown_requested(shutdown) => return Ok(Exit::Shutdown),
            sent = authenticate(connection, &self.inner.token) => sent?,
        }

        if !self.transition(SupervisorState::Streaming {
            since: Instant::now(),
        }) {
            return Ok(Exit::Shutdown);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(url = %self.inner.url, "WebSocket stream established");

        loop {
            let frame = tokio::select! {
                biased;
                () = shutdown_requested(shutdown) => return Ok(Exit::Shutdown),
                frame = connection.recv() => frame,
            };

            let message = match frame {
                None => return Ok(Exit::Closed),
                Some(Err(e)) => return Err(e),
                Some(Ok(message)) => message,
            };
            *delivered = true;

            #[cfg(feature = "tracing")]
            tracing::trace!(%message, "Dispatching WebSocket message");

            dispatch
                .dispatch(message)
                .await
                .map_err(WsError::Dispatch)?;
        }
    }

    /// Move to `next` unless shutdown was requested. Returns whether the move happened.
    fn transition(&self, next: SupervisorState) -> bool {
        let mut moved = false;
        self.inner.state_tx.send_if_modified(|state| {
            if state.is_shutting_down() {
                return false;
            }
            *state = next;
            moved = true;
            true
        });
        moved
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<SupervisorState>) {
    // The sender lives in the supervisor, so this only errors once `connect` can no longer run
    _ = shutdown
        .wait_for(|state| state.is_shutting_down())
        .await;
}

fn log_failure(error: &WsError, attempt: u32) {
    #[cfg(feature = "tracing")]
    {
        use super::error::FailureKind;

        match error.kind() {
            FailureKind::Connect => {
                tracing::warn!(kind = %error.kind(), attempt, "Unable to connect: {error}");
            }
            kind => {
                tracing::error!(%kind, attempt, "Error handling connection: {error}");
            }
        }
    }
    #[cfg(not(feature = "tracing"))]
    let _ = (error, attempt);
}
