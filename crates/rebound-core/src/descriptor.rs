//! Normalized error descriptors and the extractor that produces them.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::category::{categorize, Category};
use crate::remote::RemoteError;
use crate::retry::{self, OperationKind, RetryDecision};

/// Message used when neither the structured error nor its raw text say
/// anything.
pub const UNKNOWN_MESSAGE: &str = "unknown remote error";

/// Normalized view of a remote-call failure.
///
/// The category is derived from the status and code at construction time
/// and cannot be set independently, so two descriptors with the same
/// status/code pair always share a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDescriptor {
    status_code: u16,
    error_code: String,
    message: String,
    category: Category,
    context: BTreeMap<String, String>,
}

impl ErrorDescriptor {
    #[must_use]
    pub fn new(status_code: u16, error_code: impl Into<String>, message: impl Into<String>) -> Self {
        let error_code = error_code.into();
        let mut message = message.into();
        if message.trim().is_empty() {
            message = if error_code.is_empty() {
                UNKNOWN_MESSAGE.to_string()
            } else {
                error_code.clone()
            };
        }

        Self {
            category: categorize(status_code, &error_code),
            status_code,
            error_code,
            message,
            context: BTreeMap::new(),
        }
    }

    /// Attach a piece of diagnostic context (e.g. the offending URL).
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.status_code
    }

    #[must_use]
    pub fn error_code(&self) -> &str {
        &self.error_code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub const fn category(&self) -> Category {
        self.category
    }

    #[must_use]
    pub const fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    #[must_use]
    pub fn is_retryable(&self, kind: OperationKind) -> bool {
        retry::is_retryable(Some(self), kind)
    }

    #[must_use]
    pub fn is_non_retryable(&self, kind: OperationKind) -> bool {
        retry::is_non_retryable(Some(self), kind)
    }

    #[must_use]
    pub fn retry_decision(&self, kind: OperationKind) -> RetryDecision {
        RetryDecision::of(Some(self), kind)
    }
}

impl fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status_code, self.error_code.is_empty()) {
            (0, true) => write!(f, "{}", self.message),
            (0, false) => write!(f, "{}: {}", self.error_code, self.message),
            (status, true) => write!(f, "status {}: {}", status, self.message),
            (status, false) => {
                write!(f, "status {} ({}): {}", status, self.error_code, self.message)
            }
        }
    }
}

impl From<&RemoteError> for ErrorDescriptor {
    fn from(err: &RemoteError) -> Self {
        match err {
            RemoteError::Api {
                status,
                code,
                message,
            } => Self::new(*status, code.clone(), message.clone()),
            RemoteError::Transport { url, message } => {
                let (status, code) = match url {
                    Some(url) => classify_transport(&message.replace(url.as_str(), "")),
                    None => classify_transport(message),
                };
                let descriptor = Self::new(status, code, message.clone());
                match url {
                    Some(url) => descriptor.with_context("url", url.clone()),
                    None => descriptor,
                }
            }
            RemoteError::Other(message) => Self::new(0, "", message.clone()),
        }
    }
}

impl From<RemoteError> for ErrorDescriptor {
    fn from(err: RemoteError) -> Self {
        Self::from(&err)
    }
}

/// Turn any remote failure (or the lack of one) into a descriptor.
///
/// Never fails: an absent error yields a status-0 descriptor carrying
/// [`UNKNOWN_MESSAGE`].
#[must_use]
pub fn extract(err: Option<&RemoteError>) -> ErrorDescriptor {
    err.map_or_else(|| ErrorDescriptor::new(0, "", ""), ErrorDescriptor::from)
}

/// Best-effort mapping of transport failure text to a synthetic
/// status/code pair. The caller removes the request URL first so that a
/// path or host never reads as a failure reason.
///
/// Transport errors only carry free text, which differs across platforms
/// and locales. The rungs are checked in order because phrases overlap
/// (a TLS handshake timeout is a timeout first).
fn classify_transport(message: &str) -> (u16, &'static str) {
    const LADDER: &[(&[&str], u16, &str)] = &[
        (&["deadline", "timeout", "timed out"], 504, "RequestTimeout"),
        (&["connection refused"], 503, "ConnectionRefused"),
        (
            &[
                "no such host",
                "name resolution",
                "failed to lookup",
                "dns error",
                "name or service not known",
                "nodename nor servname",
            ],
            503,
            "HostNotFound",
        ),
        (
            &["network is unreachable", "network unreachable"],
            503,
            "NetworkUnreachable",
        ),
        (
            &[
                "certificate",
                "x509",
                "tls handshake",
                "tls error",
                "ssl handshake",
                "ssl error",
            ],
            503,
            "CertificateError",
        ),
    ];

    let lower = message.to_ascii_lowercase();
    LADDER
        .iter()
        .find(|(needles, _, _)| needles.iter().any(|needle| lower.contains(needle)))
        .map_or((400, "URLError"), |(_, status, code)| (*status, *code))
}
