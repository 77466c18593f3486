//! An in-process `Db`, for tests and for running without PostgreSQL.
//!
//! The whole store sits behind one async mutex. A transaction holds
//! the lock from `begin` until it is committed or dropped and works on
//! a private copy of the state, so an abandoned transaction leaves no
//! trace and competing transactions run strictly one after another.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::booking::{Booking, NewBooking};
use crate::class::{self, ClassOccurrence, NewClass};
use crate::db::{Db, Transaction};
use crate::errors::BackendError;
use crate::normalization::Email;

#[derive(Clone, Debug, Default)]
struct State {
    classes: HashMap<Uuid, ClassOccurrence>,
    bookings: Vec<Booking>,
}

impl State {
    fn decrement_slot(&mut self, class_id: &Uuid) -> Result<(), BackendError> {
        let class = self
            .classes
            .get_mut(class_id)
            .ok_or(BackendError::ClassNotFound(*class_id))?;

        if class.available_slots <= 0 {
            return Err(BackendError::SoldOut);
        }

        class.available_slots -= 1;

        Ok(())
    }

    fn find_booking(&self, class_id: &Uuid, email: &Email) -> Option<&Booking> {
        self.bookings
            .iter()
            .find(|b| b.class_id == *class_id && b.requester_email == email.as_str())
    }

    fn insert_booking(&mut self, booking: NewBooking) -> Result<Booking, BackendError> {
        if !self.classes.contains_key(&booking.class_id) {
            return Err(BackendError::ClassNotFound(booking.class_id));
        }

        // the equivalent of the unique constraint on (class, email)
        if self
            .find_booking(&booking.class_id, booking.requester.email())
            .is_some()
        {
            return Err(BackendError::DuplicateBooking);
        }

        let booking = booking.into_booking(Uuid::new_v4(), OffsetDateTime::now_utc());
        self.bookings.push(booking.clone());

        Ok(booking)
    }

    fn sorted(&self, predicate: impl Fn(&ClassOccurrence) -> bool) -> Vec<ClassOccurrence> {
        let mut classes: Vec<ClassOccurrence> = self
            .classes
            .values()
            .filter(|c| predicate(c))
            .cloned()
            .collect();

        classes.sort_by(class::chronologically);

        classes
    }
}

#[derive(Clone, Default)]
pub struct MemoryDb {
    state: Arc<Mutex<State>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Db for MemoryDb {
    fn begin(&self) -> BoxFuture<Result<Box<dyn Transaction>, BackendError>> {
        let state = self.state.clone();

        async move {
            let guard = state.lock_owned().await;
            let pending = guard.clone();

            Ok(Box::new(MemoryTransaction { guard, pending }) as Box<dyn Transaction>)
        }
        .boxed()
    }

    fn decrement_slot(&self, class_id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
        let class_id = *class_id;

        async move { self.state.lock().await.decrement_slot(&class_id) }.boxed()
    }

    fn insert_class(&self, class: NewClass) -> BoxFuture<Result<ClassOccurrence, BackendError>> {
        async move {
            let class = class.into_occurrence(Uuid::new_v4());

            self.state
                .lock()
                .await
                .classes
                .insert(class.id, class.clone());

            Ok(class)
        }
        .boxed()
    }

    fn retrieve_bookable(&self) -> BoxFuture<Result<Vec<ClassOccurrence>, BackendError>> {
        async move { Ok(self.state.lock().await.sorted(ClassOccurrence::is_bookable)) }.boxed()
    }

    fn retrieve_bookings(&self, email: &Email) -> BoxFuture<Result<Vec<Booking>, BackendError>> {
        let email = email.clone();

        async move {
            let state = self.state.lock().await;

            Ok(state
                .bookings
                .iter()
                .filter(|b| b.requester_email == email.as_str())
                .cloned()
                .collect())
        }
        .boxed()
    }

    fn retrieve_class(&self, id: &Uuid) -> BoxFuture<Result<Option<ClassOccurrence>, BackendError>> {
        let id = *id;

        async move { Ok(self.state.lock().await.classes.get(&id).cloned()) }.boxed()
    }

    fn retrieve_upcoming(
        &self,
        now: OffsetDateTime,
    ) -> BoxFuture<Result<Vec<ClassOccurrence>, BackendError>> {
        async move { Ok(self.state.lock().await.sorted(|c| c.start_time >= now)) }.boxed()
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<State>,
    pending: State,
}

impl Transaction for MemoryTransaction {
    fn lock_class(&mut self, id: &Uuid) -> BoxFuture<Result<Option<ClassOccurrence>, BackendError>> {
        // the store-wide lock is already held
        let class = self.pending.classes.get(id).cloned();

        async move { Ok(class) }.boxed()
    }

    fn find_booking(
        &mut self,
        class_id: &Uuid,
        email: &Email,
    ) -> BoxFuture<Result<Option<Booking>, BackendError>> {
        let booking = self.pending.find_booking(class_id, email).cloned();

        async move { Ok(booking) }.boxed()
    }

    fn decrement_slot(&mut self, class_id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
        let result = self.pending.decrement_slot(class_id);

        async move { result }.boxed()
    }

    fn insert_booking(&mut self, booking: NewBooking) -> BoxFuture<Result<Booking, BackendError>> {
        let result = self.pending.insert_booking(booking);

        async move { result }.boxed()
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), BackendError>> {
        let MemoryTransaction { mut guard, pending } = *self;
        *guard = pending;

        async move { Ok(()) }.boxed()
    }
}
