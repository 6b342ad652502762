//! Error types for the reminder scheduler.

/// Top-level error type for the background reminder scheduler.
#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
    /// Malformed schedule request (bad time, missing label, bad repeat policy).
    #[error("invalid reminder: {0}")]
    InvalidReminder(String),

    /// The persistence adapter rejected a `put`, `remove` or `get_all`.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A timer fired for an id whose record no longer exists.
    #[error("no persisted record for reminder {0}")]
    MissingRecord(String),

    /// The notification presenter refused to show a notification.
    #[error("presenter error: {0}")]
    Presenter(String),

    /// A user action referenced a reminder that is not stored.
    #[error("unknown reminder: {0}")]
    UnknownReminder(String),

    /// A notification interaction carried an action id we do not handle.
    #[error("unknown notification action: {0}")]
    UnknownAction(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Host command envelope could not be decoded into a request.
    #[error("contract error: {0}")]
    Contract(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AlarmError>;
