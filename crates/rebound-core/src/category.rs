//! Coarse failure categories and the categorizer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Coarse failure class used to pick a remediation and retry strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Credentials missing, expired or rejected.
    Authentication,
    /// Caller is authenticated but not allowed to do this.
    Authorization,
    /// The request itself is malformed or semantically invalid.
    Validation,
    /// The remote side is rate limiting the caller.
    Throttling,
    /// The call never produced an HTTP response.
    Network,
    /// The remote service failed on its side.
    Service,
    /// Nothing else matched.
    Unknown,
}

/// Substrings of a symbolic error code that mark a transport-level failure
/// when the status code alone does not resolve.
const NETWORK_CODE_HINTS: &[&str] = &["auth", "forbidden", "throttl", "network"];

impl Category {
    pub const ALL: [Self; 7] = [
        Self::Authentication,
        Self::Authorization,
        Self::Validation,
        Self::Throttling,
        Self::Network,
        Self::Service,
        Self::Unknown,
    ];

    /// Human-facing next step for this kind of failure.
    #[must_use]
    pub const fn remediation(self) -> &'static str {
        match self {
            Self::Authentication => "re-authenticate and try again",
            Self::Authorization => "request elevated permissions for this operation",
            Self::Validation => "fix the input and try again",
            Self::Throttling => "back off and retry later",
            Self::Network => "check connectivity to the remote endpoint",
            Self::Service => "wait and retry; the remote service reported a failure",
            Self::Unknown => "investigate the error details",
        }
    }

    /// Whether failures in this category usually clear up on their own.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Throttling | Self::Network | Self::Service)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::Validation => "validation",
            Self::Throttling => "throttling",
            Self::Network => "network",
            Self::Service => "service",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownCategory(s.to_string()))
    }
}

/// Map a status/code pair to its [`Category`].
///
/// The status code decides first. Only when it is `0` or not one of the
/// recognized values does the symbolic code get a say.
#[must_use]
pub fn categorize(status_code: u16, error_code: &str) -> Category {
    match status_code {
        401 => Category::Authentication,
        403 => Category::Authorization,
        400 | 422 => Category::Validation,
        429 => Category::Throttling,
        500..=599 => Category::Service,
        _ => {
            let code = error_code.to_ascii_lowercase();
            if NETWORK_CODE_HINTS.iter().any(|hint| code.contains(hint)) || status_code == 0 {
                Category::Network
            } else {
                Category::Unknown
            }
        }
    }
}
