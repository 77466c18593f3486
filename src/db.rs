use futures::future::BoxFuture;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::booking::{Booking, NewBooking};
use crate::class::{ClassOccurrence, NewClass};
use crate::errors::BackendError;
use crate::normalization::Email;

pub mod memory;

/// Durable storage for classes and bookings.
pub trait Db {
    /// Opens a transaction. Nothing done through it is visible to
    /// anyone else until it is committed, and dropping it without
    /// committing undoes everything.
    fn begin(&self) -> BoxFuture<Result<Box<dyn Transaction>, BackendError>>;

    /// Takes one slot from the class if it has any left, as a single
    /// atomic step.
    fn decrement_slot(&self, class_id: &Uuid) -> BoxFuture<Result<(), BackendError>>;

    fn insert_class(&self, class: NewClass) -> BoxFuture<Result<ClassOccurrence, BackendError>>;

    fn retrieve_bookable(&self) -> BoxFuture<Result<Vec<ClassOccurrence>, BackendError>>;

    fn retrieve_bookings(&self, email: &Email) -> BoxFuture<Result<Vec<Booking>, BackendError>>;

    fn retrieve_class(&self, id: &Uuid) -> BoxFuture<Result<Option<ClassOccurrence>, BackendError>>;

    fn retrieve_upcoming(
        &self,
        now: OffsetDateTime,
    ) -> BoxFuture<Result<Vec<ClassOccurrence>, BackendError>>;
}

/// A unit of work against a `Db`.
pub trait Transaction: Send {
    /// Loads the class and keeps any other transaction from touching it
    /// until this one finishes.
    fn lock_class(&mut self, id: &Uuid) -> BoxFuture<Result<Option<ClassOccurrence>, BackendError>>;

    fn find_booking(
        &mut self,
        class_id: &Uuid,
        email: &Email,
    ) -> BoxFuture<Result<Option<Booking>, BackendError>>;

    /// Fails with `SoldOut` when the class has no slots left.
    fn decrement_slot(&mut self, class_id: &Uuid) -> BoxFuture<Result<(), BackendError>>;

    /// Fails with `DuplicateBooking` when the requester already holds a
    /// seat in the class, whatever any earlier check said.
    fn insert_booking(&mut self, booking: NewBooking) -> BoxFuture<Result<Booking, BackendError>>;

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), BackendError>>;
}

pub use self::postgres::*;

mod postgres {
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use sqlx::{
        self,
        postgres::{PgPool, PgRow},
        Postgres,
    };
    use time::OffsetDateTime;
    use uuid::Uuid;

    use crate::booking::{Booking, NewBooking};
    use crate::class::{ClassOccurrence, NewClass};
    use crate::errors::BackendError;
    use crate::normalization::Email;

    const BOOKINGS_CLASS_EMAIL_CONSTRAINT: &str = "bookings_class_email";
    const CLASSES_AVAILABLE_SLOTS_CONSTRAINT: &str = "classes_available_slots";

    const SERIALIZATION_FAILURE: &str = "40001";
    const DEADLOCK_DETECTED: &str = "40P01";

    pub struct PgDb {
        pool: PgPool,
    }

    impl PgDb {
        pub fn new(pool: PgPool) -> Self {
            PgDb { pool }
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl super::Db for PgDb {
        fn begin(&self) -> BoxFuture<Result<Box<dyn super::Transaction>, BackendError>> {
            async move {
                let transaction = self.pool.begin().await.map_err(map_sqlx_error)?;

                Ok(Box::new(PgTransaction { transaction }) as Box<dyn super::Transaction>)
            }
            .boxed()
        }

        fn decrement_slot(&self, class_id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
            let class_id = *class_id;

            async move {
                let query = sqlx::query(include_str!("queries/decrement_slot.sql"));

                let count = query
                    .bind(class_id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                if count > 0 {
                    return Ok(());
                }

                // nothing was updated: the class is either full or missing
                let query = sqlx::query_as::<_, ClassOccurrence>(include_str!(
                    "queries/retrieve_class.sql"
                ));

                let class = query
                    .bind(class_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                match class {
                    Some(_) => Err(BackendError::SoldOut),
                    None => Err(BackendError::ClassNotFound(class_id)),
                }
            }
            .boxed()
        }

        fn insert_class(&self, class: NewClass) -> BoxFuture<Result<ClassOccurrence, BackendError>> {
            async move {
                let query = sqlx::query_as(include_str!("queries/insert_class.sql"));

                let (id,): (Uuid,) = query
                    .bind(&class.name)
                    .bind(&class.instructor)
                    .bind(class.start_time)
                    .bind(class.slots)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(class.into_occurrence(id))
            }
            .boxed()
        }

        fn retrieve_bookable(&self) -> BoxFuture<Result<Vec<ClassOccurrence>, BackendError>> {
            async move {
                let query = sqlx::query_as::<_, ClassOccurrence>(include_str!(
                    "queries/retrieve_bookable.sql"
                ));

                let classes = query.fetch_all(&self.pool).await.map_err(map_sqlx_error)?;

                Ok(classes)
            }
            .boxed()
        }

        fn retrieve_bookings(&self, email: &Email) -> BoxFuture<Result<Vec<Booking>, BackendError>> {
            let email = email.clone();

            async move {
                let query = sqlx::query(include_str!("queries/retrieve_bookings.sql"));

                let bookings = query
                    .bind(email.as_str())
                    .try_map(|row: PgRow| booking_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(bookings)
            }
            .boxed()
        }

        fn retrieve_class(
            &self,
            id: &Uuid,
        ) -> BoxFuture<Result<Option<ClassOccurrence>, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query_as::<_, ClassOccurrence>(include_str!(
                    "queries/retrieve_class.sql"
                ));

                let class = query
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(class)
            }
            .boxed()
        }

        fn retrieve_upcoming(
            &self,
            now: OffsetDateTime,
        ) -> BoxFuture<Result<Vec<ClassOccurrence>, BackendError>> {
            async move {
                let query = sqlx::query_as::<_, ClassOccurrence>(include_str!(
                    "queries/retrieve_upcoming.sql"
                ));

                let classes = query
                    .bind(now)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(classes)
            }
            .boxed()
        }
    }

    /// A transaction at PostgreSQL’s default isolation level. The class
    /// row lock taken by `lock_class` is what serializes competing
    /// bookings; the `bookings_class_email` constraint backs up the
    /// duplicate check.
    pub struct PgTransaction {
        transaction: sqlx::Transaction<'static, Postgres>,
    }

    impl super::Transaction for PgTransaction {
        fn lock_class(
            &mut self,
            id: &Uuid,
        ) -> BoxFuture<Result<Option<ClassOccurrence>, BackendError>> {
            let id = *id;

            async move {
                let query =
                    sqlx::query_as::<_, ClassOccurrence>(include_str!("queries/lock_class.sql"));

                let class = query
                    .bind(id)
                    .fetch_optional(&mut self.transaction)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(class)
            }
            .boxed()
        }

        fn find_booking(
            &mut self,
            class_id: &Uuid,
            email: &Email,
        ) -> BoxFuture<Result<Option<Booking>, BackendError>> {
            let class_id = *class_id;
            let email = email.clone();

            async move {
                let query = sqlx::query(include_str!("queries/find_booking.sql"));

                let booking = query
                    .bind(class_id)
                    .bind(email.as_str())
                    .try_map(|row: PgRow| booking_from_row(&row))
                    .fetch_optional(&mut self.transaction)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(booking)
            }
            .boxed()
        }

        fn decrement_slot(&mut self, class_id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
            let class_id = *class_id;

            async move {
                let query = sqlx::query(include_str!("queries/decrement_slot.sql"));

                let count = query
                    .bind(class_id)
                    .execute(&mut self.transaction)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                if count == 0 {
                    Err(BackendError::SoldOut)
                } else {
                    Ok(())
                }
            }
            .boxed()
        }

        fn insert_booking(&mut self, booking: NewBooking) -> BoxFuture<Result<Booking, BackendError>> {
            async move {
                let query = sqlx::query_as(include_str!("queries/insert_booking.sql"));

                let (id, created_at): (Uuid, OffsetDateTime) = query
                    .bind(booking.class_id)
                    .bind(booking.requester.name())
                    .bind(booking.requester.email().as_str())
                    .fetch_one(&mut self.transaction)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(booking.into_booking(id, created_at))
            }
            .boxed()
        }

        fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), BackendError>> {
            async move { self.transaction.commit().await.map_err(map_sqlx_error) }.boxed()
        }
    }

    fn booking_from_row(row: &PgRow) -> Result<Booking, sqlx::Error> {
        Ok(Booking {
            id: try_get(row, "id")?,
            class_id: try_get(row, "class_id")?,
            requester_name: try_get(row, "requester_name")?,
            requester_email: try_get(row, "requester_email")?,
            created_at: try_get(row, "created_at")?,
        })
    }

    fn try_get<'a, T: sqlx::Type<sqlx::Postgres> + sqlx::decode::Decode<'a, sqlx::Postgres>>(
        row: &'a PgRow,
        column: &str,
    ) -> Result<T, sqlx::Error> {
        use sqlx::prelude::*;

        row.try_get(column)
    }

    fn map_sqlx_error(error: sqlx::Error) -> BackendError {
        use sqlx::Error;

        match error {
            Error::Database(ref e) if e.constraint() == Some(BOOKINGS_CLASS_EMAIL_CONSTRAINT) => {
                BackendError::DuplicateBooking
            }
            Error::Database(ref e) if e.constraint() == Some(CLASSES_AVAILABLE_SLOTS_CONSTRAINT) => {
                BackendError::SoldOut
            }
            Error::Database(ref e)
                if matches!(
                    e.code().as_deref(),
                    Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
                ) =>
            {
                BackendError::StorageConflict
            }
            _ => BackendError::Sqlx { source: error },
        }
    }
}
