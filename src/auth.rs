/// Secret string types that redact values in debug output for security.
pub use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Bearer token used to authorize the event stream.
///
/// Usually a personal access token or a session token obtained through the REST API. It is sent
/// once per connection inside the authentication challenge and never logged.
#[derive(Clone, Debug, Deserialize)]
#[serde(transparent)]
pub struct Token(SecretString);

impl Token {
    #[must_use]
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Returns the secret.
    #[must_use]
    pub fn secret(&self) -> &SecretString {
        &self.0
    }
}

impl From<String> for Token {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

impl From<&str> for Token {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_redacted() {
        let token = Token::new("abc123");

        let debug = format!("{token:?}");
        assert!(!debug.contains("abc123"), "token leaked into {debug}");
        assert_eq!(token.secret().expose_secret(), "abc123");
    }

    #[test]
    fn deserializes_from_plain_string() {
        let token: Token = serde_json::from_str(r#""xyz""#).unwrap();

        assert_eq!(token.secret().expose_secret(), "xyz");
    }
}
