use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::{join_all, BoxFuture, FutureExt};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use studio::booking::{Booking, NewBooking};
use studio::catalog::Catalog;
use studio::class::{ClassOccurrence, NewClass};
use studio::db::memory::MemoryDb;
use studio::db::{Db, Transaction};
use studio::engine::{ReservationEngine, DEFAULT_BOOKING_ATTEMPTS};
use studio::environment::{Config, Environment};
use studio::errors::BackendError;
use studio::normalization::Email;

struct Studio {
    catalog: Catalog,
    engine: ReservationEngine,
}

impl Studio {
    fn new(db: Arc<dyn Db + Send + Sync>) -> Self {
        let logger = Arc::new(log::discard_logger());

        Studio {
            catalog: Catalog::new(logger.clone(), db.clone()),
            engine: ReservationEngine::new(logger, db, DEFAULT_BOOKING_ATTEMPTS),
        }
    }

    async fn class(&self, slots: i32) -> Uuid {
        self.catalog
            .add(NewClass::new(
                "Yoga",
                "Alice",
                OffsetDateTime::now_utc() + Duration::days(1),
                slots,
            ))
            .await
            .expect("add class")
            .id
    }

    async fn available(&self, id: &Uuid) -> i32 {
        self.catalog
            .get(id)
            .await
            .expect("get class")
            .available_slots
    }

    async fn bookings(&self, email: &str) -> Vec<Booking> {
        self.engine
            .list_bookings_for(Some(email))
            .await
            .expect("list bookings")
    }
}

fn memory_studio() -> Studio {
    Studio::new(Arc::new(MemoryDb::new()))
}

#[derive(Clone, Copy, PartialEq)]
enum Fault {
    /// The duplicate check inside the transaction never sees anything,
    /// as if every competing request had passed it at the same time.
    HideBookings,

    /// Inserting a booking never finishes.
    StallOnInsert,
}

/// Wraps a `MemoryDb` and misbehaves in controlled ways.
struct FaultyDb {
    inner: MemoryDb,
    fault: Option<Fault>,
    conflicts: Arc<AtomicUsize>,
}

impl FaultyDb {
    fn new(fault: Option<Fault>, conflicts: usize) -> Self {
        FaultyDb {
            inner: MemoryDb::new(),
            fault,
            conflicts: Arc::new(AtomicUsize::new(conflicts)),
        }
    }
}

impl Db for FaultyDb {
    fn begin(&self) -> BoxFuture<Result<Box<dyn Transaction>, BackendError>> {
        async move {
            let inner = self.inner.begin().await?;

            Ok(Box::new(FaultyTransaction {
                inner,
                fault: self.fault,
                conflicts: self.conflicts.clone(),
            }) as Box<dyn Transaction>)
        }
        .boxed()
    }

    fn decrement_slot(&self, class_id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
        self.inner.decrement_slot(class_id)
    }

    fn insert_class(&self, class: NewClass) -> BoxFuture<Result<ClassOccurrence, BackendError>> {
        self.inner.insert_class(class)
    }

    fn retrieve_bookable(&self) -> BoxFuture<Result<Vec<ClassOccurrence>, BackendError>> {
        self.inner.retrieve_bookable()
    }

    fn retrieve_bookings(&self, email: &Email) -> BoxFuture<Result<Vec<Booking>, BackendError>> {
        self.inner.retrieve_bookings(email)
    }

    fn retrieve_class(&self, id: &Uuid) -> BoxFuture<Result<Option<ClassOccurrence>, BackendError>> {
        self.inner.retrieve_class(id)
    }

    fn retrieve_upcoming(
        &self,
        now: OffsetDateTime,
    ) -> BoxFuture<Result<Vec<ClassOccurrence>, BackendError>> {
        self.inner.retrieve_upcoming(now)
    }
}

struct FaultyTransaction {
    inner: Box<dyn Transaction>,
    fault: Option<Fault>,
    conflicts: Arc<AtomicUsize>,
}

impl Transaction for FaultyTransaction {
    fn lock_class(&mut self, id: &Uuid) -> BoxFuture<Result<Option<ClassOccurrence>, BackendError>> {
        self.inner.lock_class(id)
    }

    fn find_booking(
        &mut self,
        class_id: &Uuid,
        email: &Email,
    ) -> BoxFuture<Result<Option<Booking>, BackendError>> {
        if self.fault == Some(Fault::HideBookings) {
            return async { Ok(None) }.boxed();
        }

        self.inner.find_booking(class_id, email)
    }

    fn decrement_slot(&mut self, class_id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
        self.inner.decrement_slot(class_id)
    }

    fn insert_booking(&mut self, booking: NewBooking) -> BoxFuture<Result<Booking, BackendError>> {
        if self.fault == Some(Fault::StallOnInsert) {
            return futures::future::pending().boxed();
        }

        self.inner.insert_booking(booking)
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), BackendError>> {
        let conflicted = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if conflicted {
            // dropping the inner transaction rolls it back
            return async { Err(BackendError::StorageConflict) }.boxed();
        }

        self.inner.commit()
    }
}

#[tokio::test]
async fn booking_a_class_to_capacity() {
    let studio = memory_studio();
    let c = studio.class(3).await;

    studio.engine.book(&c, "Ann", "ann@x.com").await.unwrap();
    assert_eq!(studio.available(&c).await, 2);

    assert!(matches!(
        studio.engine.book(&c, "Ann", "ann@x.com").await,
        Err(BackendError::DuplicateBooking)
    ));
    assert_eq!(studio.available(&c).await, 2);

    studio.engine.book(&c, "Bo", "bo@x.com").await.unwrap();
    studio.engine.book(&c, "Cy", "cy@x.com").await.unwrap();
    assert_eq!(studio.available(&c).await, 0);

    assert!(matches!(
        studio.engine.book(&c, "Dee", "dee@x.com").await,
        Err(BackendError::SoldOut)
    ));
    assert!(studio.bookings("dee@x.com").await.is_empty());
    assert_eq!(studio.available(&c).await, 0);

    let bookable = studio.catalog.list_bookable().await.unwrap();
    assert!(bookable.iter().all(|class| class.id != c));
}

#[tokio::test]
async fn sold_out_classes_never_gain_bookings() {
    let studio = memory_studio();
    let c = studio.class(1).await;

    studio.engine.book(&c, "Ann", "ann@x.com").await.unwrap();

    for i in 0..5 {
        let email = format!("late{}@x.com", i);

        assert!(matches!(
            studio.engine.book(&c, "Late", &email).await,
            Err(BackendError::SoldOut)
        ));
        assert!(studio.bookings(&email).await.is_empty());
    }

    assert_eq!(studio.available(&c).await, 0);
}

#[tokio::test]
async fn one_requester_can_book_different_classes() {
    let studio = memory_studio();
    let yoga = studio.class(2).await;
    let zumba = studio.class(2).await;

    studio.engine.book(&yoga, "Ann", "ann@x.com").await.unwrap();
    studio.engine.book(&zumba, "Ann", "ann@x.com").await.unwrap();

    let classes: Vec<Uuid> = studio
        .bookings("ann@x.com")
        .await
        .into_iter()
        .map(|b| b.class_id)
        .collect();

    assert_eq!(classes, vec![yoga, zumba]);
}

#[tokio::test]
async fn listing_bookings_is_repeatable() {
    let studio = memory_studio();
    let yoga = studio.class(2).await;
    let zumba = studio.class(2).await;

    studio.engine.book(&yoga, "Ann", "ann@x.com").await.unwrap();
    studio.engine.book(&zumba, "Ann", "Ann@X.com").await.unwrap();

    let first = studio.bookings("ann@x.com").await;
    let second = studio.bookings("ann@x.com").await;

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_for_the_last_slot() {
    const RACERS: usize = 24;

    let studio = Arc::new(memory_studio());
    let c = studio.class(1).await;

    let handles = (0..RACERS).map(|i| {
        let studio = studio.clone();

        tokio::spawn(async move {
            let email = format!("racer{}@x.com", i);
            studio.engine.book(&c, "Racer", &email).await
        })
    });

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("join booking task"))
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let sold_out = results
        .iter()
        .filter(|r| matches!(r, Err(BackendError::SoldOut)))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(sold_out, RACERS - 1);
    assert_eq!(studio.available(&c).await, 0);

    let mut booked = 0;
    for i in 0..RACERS {
        booked += studio.bookings(&format!("racer{}@x.com", i)).await.len();
    }
    assert_eq!(booked, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_with_the_same_email() {
    const RACERS: usize = 24;

    let studio = Arc::new(memory_studio());
    let c = studio.class(5).await;

    let handles = (0..RACERS).map(|i| {
        let studio = studio.clone();
        // vary the case so canonicalization is part of the race
        let email = if i % 2 == 0 { "ann@x.com" } else { "ANN@x.com" };

        tokio::spawn(async move { studio.engine.book(&c, "Ann", email).await })
    });

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("join booking task"))
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(BackendError::DuplicateBooking)))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(duplicates, RACERS - 1);
    assert_eq!(studio.available(&c).await, 4);
    assert_eq!(studio.bookings("ann@x.com").await.len(), 1);
}

#[tokio::test]
async fn storage_rejects_duplicates_the_fast_path_missed() {
    let studio = Studio::new(Arc::new(FaultyDb::new(Some(Fault::HideBookings), 0)));
    let c = studio.class(3).await;

    studio.engine.book(&c, "Ann", "ann@x.com").await.unwrap();

    // the slot taken before the insert failed must be given back
    assert!(matches!(
        studio.engine.book(&c, "Ann", "ann@x.com").await,
        Err(BackendError::DuplicateBooking)
    ));
    assert_eq!(studio.available(&c).await, 2);
    assert_eq!(studio.bookings("ann@x.com").await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn storage_rejects_racing_duplicates_the_fast_path_missed() {
    const RACERS: usize = 16;

    let studio = Arc::new(Studio::new(Arc::new(FaultyDb::new(
        Some(Fault::HideBookings),
        0,
    ))));
    let c = studio.class(RACERS as i32).await;

    let handles = (0..RACERS).map(|_| {
        let studio = studio.clone();

        tokio::spawn(async move { studio.engine.book(&c, "Ann", "ann@x.com").await })
    });

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("join booking task"))
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(BackendError::DuplicateBooking)))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(duplicates, RACERS - 1);
    assert_eq!(studio.available(&c).await, RACERS as i32 - 1);
}

#[tokio::test]
async fn conflicts_are_retried() {
    let studio = Studio::new(Arc::new(FaultyDb::new(
        None,
        DEFAULT_BOOKING_ATTEMPTS as usize - 1,
    )));
    let c = studio.class(3).await;

    let booking = studio.engine.book(&c, "Ann", "ann@x.com").await.unwrap();

    assert_eq!(studio.bookings("ann@x.com").await, vec![booking]);
    assert_eq!(studio.available(&c).await, 2);
}

#[tokio::test]
async fn persistent_conflicts_make_booking_unavailable() {
    let studio = Studio::new(Arc::new(FaultyDb::new(
        None,
        DEFAULT_BOOKING_ATTEMPTS as usize,
    )));
    let c = studio.class(3).await;

    match studio.engine.book(&c, "Ann", "ann@x.com").await {
        Err(BackendError::Unavailable { attempts }) => {
            assert_eq!(attempts, DEFAULT_BOOKING_ATTEMPTS)
        }
        other => panic!("expected Unavailable, got {:?}", other),
    }

    assert!(studio.bookings("ann@x.com").await.is_empty());
    assert_eq!(studio.available(&c).await, 3);

    // the injected conflicts are used up now
    studio.engine.book(&c, "Ann", "ann@x.com").await.unwrap();
    assert_eq!(studio.available(&c).await, 2);
}

#[tokio::test]
async fn configured_attempts_reach_the_engine() {
    let environment = Environment::new(
        Arc::new(log::discard_logger()),
        Arc::new(FaultyDb::new(None, 1)),
        Config::new(1),
    );
    let c = environment
        .catalog
        .add(NewClass::new(
            "Yoga",
            "Alice",
            OffsetDateTime::now_utc() + Duration::days(1),
            3,
        ))
        .await
        .unwrap()
        .id;

    assert!(matches!(
        environment.engine.book(&c, "Ann", "ann@x.com").await,
        Err(BackendError::Unavailable { attempts: 1 })
    ));
}

#[tokio::test]
async fn abandoned_bookings_leave_no_trace() {
    let studio = Studio::new(Arc::new(FaultyDb::new(Some(Fault::StallOnInsert), 0)));
    let c = studio.class(3).await;

    let result = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        studio.engine.book(&c, "Ann", "ann@x.com"),
    )
    .await;

    assert!(result.is_err(), "booking should still have been pending");
    assert_eq!(studio.available(&c).await, 3);
    assert!(studio.bookings("ann@x.com").await.is_empty());
}
