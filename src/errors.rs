use thiserror::Error;
use uuid::Uuid;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Represents an SQL error.
    #[error("SQLx error")]
    Sqlx { source: sqlx::Error },

    /// Represents a request for a class that doesn’t exist.
    #[error("Class {0} does not exist")]
    ClassNotFound(Uuid),

    /// Represents a second booking by the same requester for the same class.
    #[error("You've already booked this class")]
    DuplicateBooking,

    /// Represents a booking attempt on a class with no slots left.
    #[error("Booking failed: class is sold out")]
    SoldOut,

    /// Represents a transient write conflict in the store. The booking
    /// sequence can simply be run again.
    #[error("Storage conflict")]
    StorageConflict,

    /// Represents a booking that kept running into storage conflicts.
    #[error("Booking is temporarily unavailable (gave up after {attempts} attempts)")]
    Unavailable { attempts: u8 },

    /// Represents an unusable requester name or email.
    #[error("Invalid requester: {0}")]
    InvalidRequester(&'static str),

    /// Represents an unusable class definition.
    #[error("Invalid class: {0}")]
    InvalidClass(&'static str),

    /// Represents a request body that couldn’t be deserialized.
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// Represents an identifier that couldn’t be parsed.
    #[error("Invalid ID {0}")]
    InvalidId(String),
}

impl BackendError {
    /// A stable code that callers can match on without parsing messages.
    pub fn code(&self) -> &'static str {
        use BackendError::*;

        match self {
            Sqlx { .. } => "storage_error",
            ClassNotFound(_) => "class_not_found",
            DuplicateBooking => "duplicate_booking",
            SoldOut => "sold_out",
            StorageConflict | Unavailable { .. } => "unavailable",
            InvalidRequester(_) => "invalid_requester",
            InvalidClass(_) => "invalid_class",
            InvalidBody(_) => "invalid_body",
            InvalidId(_) => "invalid_id",
        }
    }
}
