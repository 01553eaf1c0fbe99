//! The failure value a remote-call client hands back.

use std::error::Error as StdError;

use serde::Deserialize;
use thiserror::Error;

/// A failed remote call, as raised by whatever client performed it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The remote API answered with a structured error.
    #[error("API error {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// The request never got an HTTP answer (bad URL, DNS, TLS, refused...).
    #[error("transport error: {message}")]
    Transport {
        url: Option<String>,
        message: String,
    },

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

/// Code and message as they appear in a JSON error body.
#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    #[serde(alias = "errorCode", alias = "error_code")]
    code: Option<String>,
    #[serde(alias = "error", alias = "detail")]
    message: Option<String>,
}

/// Either `{"error": {"code": .., "message": ..}}` (Microsoft Graph and
/// other OData APIs) or a flat payload. The nested shape is tried first.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Nested { error: ErrorPayload },
    Flat(ErrorPayload),
}

impl From<ErrorBody> for ErrorPayload {
    fn from(body: ErrorBody) -> Self {
        match body {
            ErrorBody::Nested { error } | ErrorBody::Flat(error) => error,
        }
    }
}

impl RemoteError {
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn transport(url: Option<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Build an [`RemoteError::Api`] from a non-success response.
    ///
    /// The body is parsed as a JSON error payload when possible; otherwise
    /// the raw body becomes the message.
    #[must_use]
    pub fn from_response(status: u16, body: &str) -> Self {
        let payload = match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => ErrorPayload::from(parsed),
            Err(e) => {
                log::trace!("Error body for status {} is not a JSON payload: {}", status, e);
                ErrorPayload::default()
            }
        };

        Self::Api {
            status,
            code: payload.code.unwrap_or_default(),
            message: payload
                .message
                .unwrap_or_else(|| body.trim().to_string()),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(ToString::to_string);
        // reqwest prints the URL inside its message; keep it in `url` only.
        let err = err.without_url();
        let text = error_chain_text(&err);

        if let Some(status) = err.status() {
            let code = status
                .canonical_reason()
                .unwrap_or_default()
                .replace(' ', "");
            return Self::api(status.as_u16(), code, text);
        }

        if url.is_some() || err.is_connect() || err.is_timeout() || err.is_request() {
            let message = if err.is_timeout() && !text.to_ascii_lowercase().contains("time") {
                format!("{text} (timeout)")
            } else {
                text
            };
            return Self::Transport { url, message };
        }

        Self::Other(text)
    }
}

/// Join an error and all of its sources into one line.
///
/// Transport clients tend to put the interesting part ("connection refused",
/// "dns error") in a nested source rather than the top-level message.
fn error_chain_text(err: &dyn StdError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_response_json_payload() {
        let err = RemoteError::from_response(
            429,
            r#"{"code": "RequestThrottled", "message": "slow down"}"#,
        );
        assert_eq!(err, RemoteError::api(429, "RequestThrottled", "slow down"));
    }

    #[test]
    fn test_from_response_payload_aliases() {
        let err = RemoteError::from_response(
            404,
            r#"{"errorCode": "ResourceNotFound", "error": "no such device"}"#,
        );
        assert_eq!(err, RemoteError::api(404, "ResourceNotFound", "no such device"));
    }

    #[test]
    fn test_from_response_nested_error_object() {
        let err = RemoteError::from_response(
            404,
            r#"{"error": {"code": "Request_ResourceNotFound", "message": "Resource 'abc' does not exist", "innerError": {"request-id": "42"}}}"#,
        );
        assert_eq!(
            err,
            RemoteError::api(404, "Request_ResourceNotFound", "Resource 'abc' does not exist")
        );
    }

    #[test]
    fn test_from_response_error_string_stays_flat() {
        let err = RemoteError::from_response(400, r#"{"error": "bad filter"}"#);
        assert_eq!(err, RemoteError::api(400, "", "bad filter"));
    }

    #[test]
    fn test_from_response_plain_body() {
        let err = RemoteError::from_response(502, "  Bad Gateway\n");
        assert_eq!(err, RemoteError::api(502, "", "Bad Gateway"));
    }

    #[test]
    fn test_from_response_json_without_message() {
        let err = RemoteError::from_response(409, r#"{"code": "Conflict"}"#);
        match err {
            RemoteError::Api { code, message, .. } => {
                assert_eq!(code, "Conflict");
                assert!(message.contains("Conflict"));
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[derive(Debug, Error)]
    #[error("outer failure")]
    struct Outer(#[source] Inner);

    #[derive(Debug, Error)]
    #[error("connection refused")]
    struct Inner;

    #[test]
    fn test_error_chain_text_includes_sources() {
        let text = error_chain_text(&Outer(Inner));
        assert_eq!(text, "outer failure: connection refused");
    }

    #[tokio::test]
    async fn test_from_reqwest_connect_error() {
        // Port 1 on localhost is essentially never listening.
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:1/devices")
            .send()
            .await
            .unwrap_err();
        match RemoteError::from(err) {
            RemoteError::Transport { url, .. } => {
                assert_eq!(url.as_deref(), Some("http://127.0.0.1:1/devices"));
            }
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reqwest_url_does_not_leak_into_message() {
        let url = "http://127.0.0.1:1/v1/deadlineSettings";
        let err = reqwest::Client::new().get(url).send().await.unwrap_err();
        let remote = RemoteError::from(err);
        match &remote {
            RemoteError::Transport { url: kept, message } => {
                assert_eq!(kept.as_deref(), Some(url));
                assert!(!message.contains("deadlineSettings"), "{message}");
            }
            other => panic!("expected Transport, got {other:?}"),
        }

        let descriptor = crate::ErrorDescriptor::from(&remote);
        assert_eq!(descriptor.status_code(), 503);
        assert_eq!(descriptor.error_code(), "ConnectionRefused");
    }
}
