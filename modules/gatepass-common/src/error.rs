use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, GatepassError>;

/// Every recoverable failure the domain layer can hand back to a caller.
/// Missing rows are detected with `fetch_optional`, so a `sqlx::Error`
/// landing in `StorageUnavailable` is a genuine storage fault.
#[derive(Error, Debug)]
pub enum GatepassError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("No tickets left in package {0}")]
    InsufficientStock(Uuid),

    #[error("Ticket {0} has already been validated")]
    AlreadyValidated(Uuid),

    #[error("Ticket {0} does not belong to the caller")]
    NotOwner(Uuid),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
