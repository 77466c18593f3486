use serde::Serialize;

use crate::booking::Booking;
use crate::class::ClassOccurrence;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SuccessResponse<'a> {
    Booked {
        booking: Booking,
    },
    Bookings {
        email: Option<String>,
        bookings: Vec<Booking>,
    },
    Classes {
        classes: Vec<ClassOccurrence>,
    },
    Healthz {
        revision: Option<&'a str>,
        timestamp: Option<&'a str>,
        version: &'a str,
    },
}
