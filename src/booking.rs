use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::BackendError;
use crate::normalization::{self, Email};

/// A record that a requester holds one seat in one class. Never
/// modified after creation.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Booking {
    /// The ID of the booking.
    pub id: Uuid,

    /// The class the seat is in.
    pub class_id: Uuid,

    /// The name given when booking.
    pub requester_name: String,

    /// The canonical email given when booking.
    pub requester_email: String,

    /// When the booking was stored.
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
}

/// The identity a booking is made under, resolved by the caller.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Requester {
    pub(crate) name: String,
    pub(crate) email: Email,
}

impl Requester {
    pub fn new(name: impl AsRef<str>, email: impl AsRef<str>) -> Result<Self, BackendError> {
        let name = normalization::normalize_name(name);

        if name.is_empty() {
            return Err(BackendError::InvalidRequester("name must not be empty"));
        }

        Ok(Requester {
            name,
            email: Email::parse(email)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &Email {
        &self.email
    }
}

/// A booking that hasn’t been stored yet.
#[derive(Clone, Debug)]
pub struct NewBooking {
    pub class_id: Uuid,
    pub requester: Requester,
}

impl NewBooking {
    pub(crate) fn into_booking(self, id: Uuid, created_at: OffsetDateTime) -> Booking {
        Booking {
            id,
            class_id: self.class_id,
            requester_name: self.requester.name,
            requester_email: self.requester.email.as_str().to_owned(),
            created_at,
        }
    }
}

/// The body of a booking request.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BookingRequest {
    pub class_id: Uuid,

    #[serde(deserialize_with = "normalization::deserialize")]
    pub name: String,

    pub email: String,
}
