use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::BackendError;
use crate::normalization;

/// One scheduled instance of a fitness class.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, sqlx::FromRow)]
pub struct ClassOccurrence {
    /// The ID of the class.
    pub id: Uuid,

    /// The name of the class, e.g. “Yoga”.
    pub name: String,

    /// The person teaching it.
    pub instructor: String,

    /// When it starts.
    #[serde(with = "time::serde::timestamp")]
    pub start_time: OffsetDateTime,

    /// The capacity it was created with.
    pub total_slots: i32,

    /// The capacity left. Never negative, never above `total_slots`.
    pub available_slots: i32,
}

impl ClassOccurrence {
    pub fn is_bookable(&self) -> bool {
        self.available_slots > 0
    }
}

/// A class that hasn’t been stored yet.
#[derive(Clone, Debug)]
pub struct NewClass {
    pub name: String,
    pub instructor: String,
    pub start_time: OffsetDateTime,
    pub slots: i32,
}

impl NewClass {
    pub fn new(
        name: impl AsRef<str>,
        instructor: impl AsRef<str>,
        start_time: OffsetDateTime,
        slots: i32,
    ) -> Self {
        NewClass {
            name: normalization::normalize_name(name),
            instructor: normalization::normalize_name(instructor),
            start_time,
            slots,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), BackendError> {
        if self.name.is_empty() {
            return Err(BackendError::InvalidClass("name must not be empty"));
        }

        if self.instructor.is_empty() {
            return Err(BackendError::InvalidClass("instructor must not be empty"));
        }

        if self.slots <= 0 {
            return Err(BackendError::InvalidClass("slots must be positive"));
        }

        Ok(())
    }

    /// Turns this into a stored class with the given ID and all slots free.
    pub(crate) fn into_occurrence(self, id: Uuid) -> ClassOccurrence {
        ClassOccurrence {
            id,
            name: self.name,
            instructor: self.instructor,
            start_time: self.start_time,
            total_slots: self.slots,
            available_slots: self.slots,
        }
    }
}

/// Orders classes by start time, then by ID so that classes starting
/// together always come out in the same order.
pub(crate) fn chronologically(a: &ClassOccurrence, b: &ClassOccurrence) -> std::cmp::Ordering {
    a.start_time
        .cmp(&b.start_time)
        .then_with(|| a.id.cmp(&b.id))
}
