use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt as _, StreamExt as _};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config,
};

use super::config::TransportSettings;
use super::error::WsError;
use super::traits::{Connection, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Transport`] backed by `tokio-tungstenite` with `rustls`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    type Connection = TungsteniteConnection;

    async fn open(
        &self,
        url: &str,
        settings: &TransportSettings,
    ) -> Result<TungsteniteConnection, WsError> {
        install_crypto_provider();

        let connector = if settings.verify_tls {
            None
        } else {
            #[cfg(feature = "tracing")]
            tracing::debug!("TLS certificate verification disabled");
            Some(Connector::Rustls(Arc::new(insecure_tls_config())))
        };

        let (stream, _response) = connect_async_tls_with_config(url, None, false, connector)
            .await
            .map_err(WsError::connect)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(%url, "WebSocket connection opened");

        Ok(TungsteniteConnection::new(stream, settings))
    }
}

/// What woke up [`TungsteniteConnection::recv`].
enum Wakeup {
    Frame(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
    Heartbeat,
    Idle,
    PongOverdue,
}

/// An open `tokio-tungstenite` connection with heartbeat and idle-timeout enforcement.
///
/// A PING is sent every `heartbeat_interval`. Any inbound frame counts as a sign of life; if
/// nothing arrives within `heartbeat_timeout` of a PING, or within `receive_timeout` of a
/// [`Connection::recv`] call or the last frame it consumed, `recv` fails.
pub struct TungsteniteConnection {
    stream: WsStream,
    heartbeat: Interval,
    heartbeat_timeout: Duration,
    receive_timeout: Duration,
    pong_deadline: Option<Instant>,
    finished: bool,
    released: bool,
}

impl TungsteniteConnection {
    fn new(stream: WsStream, settings: &TransportSettings) -> Self {
        let now = Instant::now();
        let mut heartbeat = interval_at(
            now + settings.heartbeat_interval,
            settings.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            stream,
            heartbeat,
            heartbeat_timeout: settings.heartbeat_timeout,
            receive_timeout: settings.receive_timeout,
            pong_deadline: None,
            finished: false,
            released: false,
        }
    }

    fn finish<T>(&mut self, result: T) -> T {
        self.finished = true;
        result
    }
}

#[async_trait]
impl Connection for TungsteniteConnection {
    async fn send_text(&mut self, text: String) -> Result<(), WsError> {
        if self.finished {
            return Err(WsError::ConnectionClosed);
        }

        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(WsError::from)
    }

    async fn recv(&mut self) -> Option<Result<String, WsError>> {
        if self.finished {
            return None;
        }

        // Time spent by the caller between calls does not count
        let mut idle_deadline = Instant::now() + self.receive_timeout;

        loop {
            let pong_deadline = self.pong_deadline;

            // A buffered frame always wins over an expired timer
            let wakeup = tokio::select! {
                biased;
                frame = self.stream.next() => Wakeup::Frame(frame),
                _ = self.heartbeat.tick() => Wakeup::Heartbeat,
                () = sleep_until(idle_deadline) => Wakeup::Idle,
                () = overdue(pong_deadline) => Wakeup::PongOverdue,
            };

            match wakeup {
                Wakeup::Frame(None) => return self.finish(None),
                Wakeup::Frame(Some(Err(e))) => {
                    return self.finish(match WsError::from(e) {
                        // Reading after the close handshake completed
                        WsError::ConnectionClosed => None,
                        other => Some(Err(other)),
                    });
                }
                Wakeup::Frame(Some(Ok(message))) => {
                    idle_deadline = Instant::now() + self.receive_timeout;
                    self.pong_deadline = None;

                    match message {
                        Message::Text(text) => {
                            #[cfg(feature = "tracing")]
                            tracing::trace!(%text, "Received WebSocket text message");
                            return Some(Ok(text.as_str().to_owned()));
                        }
                        Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                            Ok(text) => return Some(Ok(text)),
                            Err(e) => {
                                #[cfg(feature = "tracing")]
                                tracing::debug!(error = %e, "Skipping non UTF-8 binary frame");
                                #[cfg(not(feature = "tracing"))]
                                let _ = &e;
                            }
                        },
                        Message::Close(frame) => {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(?frame, "WebSocket closed by server");
                            #[cfg(not(feature = "tracing"))]
                            let _ = &frame;
                            return self.finish(None);
                        }
                        // PING replies are queued by tungstenite and flushed on the next I/O
                        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                    }
                }
                Wakeup::Heartbeat => {
                    if let Err(e) = self.stream.send(Message::Ping(Default::default())).await {
                        return self.finish(Some(Err(e.into())));
                    }
                    if self.pong_deadline.is_none() {
                        self.pong_deadline = Some(Instant::now() + self.heartbeat_timeout);
                    }
                }
                Wakeup::Idle => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        "No WebSocket frame received within {:?}",
                        self.receive_timeout
                    );
                    return self.finish(Some(Err(WsError::Timeout)));
                }
                Wakeup::PongOverdue => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        "Heartbeat timeout: no PONG received within {:?}",
                        self.heartbeat_timeout
                    );
                    return self.finish(Some(Err(WsError::HeartbeatTimeout)));
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.finished = true;

        // A dead peer must not hold the supervisor up
        match timeout(self.heartbeat_timeout, self.stream.close(None)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(error = %e, "WebSocket close handshake failed");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
            }
            Err(_elapsed) => {
                #[cfg(feature = "tracing")]
                tracing::trace!("WebSocket close handshake timed out");
            }
        }
    }
}

async fn overdue(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn install_crypto_provider() {
    // Fails harmlessly when a provider is already installed
    _ = rustls::crypto::ring::default_provider().install_default();
}

fn insecure_tls_config() -> rustls::ClientConfig {
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
        .with_no_client_auth()
}

/// Used only when the caller turned certificate verification off.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::CryptoProvider::get_default()
            .map(|provider| provider.signature_verification_algorithms.supported_schemes())
            .unwrap_or_default()
    }
}
