use std::sync::Arc;

use log::{debug, info, o, warn, Logger};
use uuid::Uuid;

use crate::booking::{Booking, NewBooking, Requester};
use crate::db::Db;
use crate::errors::BackendError;
use crate::normalization::Email;

/// How many times a booking is attempted when the store reports a
/// transient conflict.
pub const DEFAULT_BOOKING_ATTEMPTS: u8 = 3;

/// Accepts and lists bookings, keeping every class’s slot count and
/// booking set consistent with each other.
#[derive(Clone)]
pub struct ReservationEngine {
    logger: Arc<Logger>,
    db: Arc<dyn Db + Send + Sync>,
    attempts: u8,
}

impl ReservationEngine {
    pub fn new(logger: Arc<Logger>, db: Arc<dyn Db + Send + Sync>, attempts: u8) -> Self {
        ReservationEngine {
            logger,
            db,
            attempts: attempts.max(1),
        }
    }

    /// Reserves one seat in the class for the requester.
    ///
    /// The lookup, duplicate check, slot decrement and insert run in a
    /// single transaction: either all of them take effect or none do,
    /// including when the returned future is dropped halfway through.
    pub async fn book(
        &self,
        class_id: &Uuid,
        name: impl AsRef<str>,
        email: impl AsRef<str>,
    ) -> Result<Booking, BackendError> {
        let requester = Requester::new(name, email)?;
        let logger = self.logger.new(o!(
            "class_id" => class_id.to_string(),
            "email" => requester.email().to_string()
        ));

        for attempt in 1..=self.attempts {
            debug!(logger, "Attempting booking..."; "attempt" => attempt);

            match self.try_book(class_id, &requester).await {
                Err(BackendError::StorageConflict) => {
                    warn!(logger, "Storage conflict while booking"; "attempt" => attempt);
                }
                Ok(booking) => {
                    info!(logger, "Booked"; "booking_id" => %booking.id);
                    return Ok(booking);
                }
                Err(e) => {
                    debug!(logger, "Booking rejected"; "error" => %e);
                    return Err(e);
                }
            }
        }

        warn!(logger, "Giving up on booking"; "attempts" => self.attempts);

        Err(BackendError::Unavailable {
            attempts: self.attempts,
        })
    }

    async fn try_book(
        &self,
        class_id: &Uuid,
        requester: &Requester,
    ) -> Result<Booking, BackendError> {
        let mut transaction = self.db.begin().await?;

        transaction
            .lock_class(class_id)
            .await?
            .ok_or(BackendError::ClassNotFound(*class_id))?;

        // only a shortcut: the store rejects duplicates on insert anyway
        if transaction
            .find_booking(class_id, requester.email())
            .await?
            .is_some()
        {
            return Err(BackendError::DuplicateBooking);
        }

        transaction.decrement_slot(class_id).await?;

        let booking = transaction
            .insert_booking(NewBooking {
                class_id: *class_id,
                requester: requester.clone(),
            })
            .await?;

        transaction.commit().await?;

        Ok(booking)
    }

    /// Every booking held under the email, after canonicalization. A
    /// missing, blank or unknown email simply has no bookings.
    pub async fn list_bookings_for(
        &self,
        email: Option<&str>,
    ) -> Result<Vec<Booking>, BackendError> {
        let email = match email.map(Email::parse) {
            Some(Ok(email)) => email,
            _ => return Ok(vec![]),
        };

        self.db.retrieve_bookings(&email).await
    }
}
