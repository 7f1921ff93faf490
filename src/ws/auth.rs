use secrecy::ExposeSecret as _;
use serde::Serialize;

use super::error::WsError;
use super::traits::Connection;
use crate::auth::Token;

const AUTHENTICATION_CHALLENGE: &str = "authentication_challenge";

/// The frame that authorizes a freshly opened connection.
///
/// Serializes to `{"seq":1,"action":"authentication_challenge","data":{"token":"..."}}`.
#[derive(Debug, Serialize)]
pub struct AuthFrame<'a> {
    seq: u64,
    action: &'static str,
    data: AuthData<'a>,
}

#[derive(Debug, Serialize)]
struct AuthData<'a> {
    token: &'a str,
}

impl<'a> AuthFrame<'a> {
    #[must_use]
    pub fn new(token: &'a Token) -> Self {
        Self {
            seq: 1,
            action: AUTHENTICATION_CHALLENGE,
            data: AuthData {
                token: token.secret().expose_secret(),
            },
        }
    }
}

/// Send the authentication challenge over a connection that was just opened.
///
/// Fire-and-forget: the server's reply is not awaited. A rejected token surfaces later as a
/// closed stream, an error frame handed to the dispatcher, or a liveness failure.
pub async fn authenticate<C: Connection + ?Sized>(
    connection: &mut C,
    token: &Token,
) -> Result<(), WsError> {
    #[cfg(feature = "tracing")]
    tracing::info!("Authenticating websocket");

    let frame = serde_json::to_string(&AuthFrame::new(token))
        .map_err(|e| WsError::Handshake(Box::new(WsError::transport(e))))?;

    connection
        .send_text(frame)
        .await
        .map_err(|e| WsError::Handshake(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        sent: Vec<String>,
        broken: bool,
    }

    #[async_trait]
    impl Connection for Recorder {
        async fn send_text(&mut self, text: String) -> Result<(), WsError> {
            if self.broken {
                return Err(WsError::ConnectionClosed);
            }
            self.sent.push(text);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String, WsError>> {
            None
        }

        async fn close(&mut self) {}
    }

    #[test]
    fn frame_has_exact_shape() {
        let token = Token::new("s3cr3t");

        let frame = serde_json::to_string(&AuthFrame::new(&token)).unwrap();

        assert_eq!(
            frame,
            r#"{"seq":1,"action":"authentication_challenge","data":{"token":"s3cr3t"}}"#
        );
    }

    #[test]
    fn token_is_escaped() {
        let token = Token::new(r#"a"b\c"#);

        let frame = serde_json::to_string(&AuthFrame::new(&token)).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(value["data"]["token"], json!(r#"a"b\c"#));
    }

    #[tokio::test]
    async fn sends_single_frame() {
        let mut connection = Recorder::default();

        authenticate(&mut connection, &Token::new("abc")).await.unwrap();

        assert_eq!(connection.sent.len(), 1);
        let value: Value = serde_json::from_str(&connection.sent[0]).unwrap();
        assert_eq!(
            value,
            json!({"seq": 1, "action": "authentication_challenge", "data": {"token": "abc"}})
        );
    }

    #[tokio::test]
    async fn send_failure_is_handshake_error() {
        let mut connection = Recorder {
            broken: true,
            ..Recorder::default()
        };

        let error = authenticate(&mut connection, &Token::new("abc"))
            .await
            .unwrap_err();

        assert!(matches!(error, WsError::Handshake(_)));
    }
}
