use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Tags one bulk operation run so its log lines and report can be matched up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// A fresh random ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight hex digits keep log lines short and are plenty within one run.
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}
