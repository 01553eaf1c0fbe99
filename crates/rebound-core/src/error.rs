use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown operation kind: {0} (expected `read` or `delete`)")]
    UnknownOperationKind(String),

    #[error("unknown category: {0}")]
    UnknownCategory(String),
}

pub type Result<T> = std::result::Result<T, Error>;
