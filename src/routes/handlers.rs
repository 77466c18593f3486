use std::time::{Duration, Instant};

use log::{debug, info, o};
use time::OffsetDateTime;
use uuid::Uuid;
use warp::{
    http::StatusCode,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::booking::BookingRequest;
use crate::environment::Environment;
use crate::errors::BackendError;
use crate::routes::{
    query::BookingsQuery,
    rejection::{to_rejection, Context},
    response::SuccessResponse,
};

const SERVER_TIMING_HEADER: &str = "server-timing";
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($expression:stmt);+) => {
        let start = Instant::now();

        let result = { $($expression)+ };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    };
}

pub async fn upcoming(environment: Environment) -> RouteResult {
    timed! {
        let classes = environment
            .catalog
            .list_upcoming(OffsetDateTime::now_utc())
            .await
            .map_err(|e: BackendError| to_rejection(Context::upcoming(), e))?;

        json(&SuccessResponse::Classes { classes })
    }
}

pub async fn bookable(environment: Environment) -> RouteResult {
    timed! {
        let classes = environment
            .catalog
            .list_bookable()
            .await
            .map_err(|e: BackendError| to_rejection(Context::bookable(), e))?;

        json(&SuccessResponse::Classes { classes })
    }
}

pub async fn class(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| to_rejection(Context::class(id.clone()), e);

        let id = Uuid::parse_str(&id)
            .map_err(|_| BackendError::InvalidId(id.clone()))
            .map_err(error_handler)?;
        debug!(environment.logger, "Retrieving class..."; "id" => %id);

        let class = environment.catalog.get(&id).await.map_err(error_handler)?;

        json(&class)
    }
}

pub async fn book(environment: Environment, request: BookingRequest) -> RouteResult {
    timed! {
        let BookingRequest { class_id, name, email } = request;

        let logger = environment.logger.new(o!("class_id" => class_id.to_string()));
        let error_handler = |e: BackendError| to_rejection(Context::book(class_id, email.clone()), e);

        debug!(logger, "Booking...");
        let booking = environment
            .engine
            .book(&class_id, &name, &email)
            .await
            .map_err(error_handler)?;

        info!(logger, "Sending booking response..."; "booking_id" => %booking.id);
        with_status(json(&SuccessResponse::Booked { booking }), StatusCode::CREATED)
    }
}

pub async fn bookings(environment: Environment, query: BookingsQuery) -> RouteResult {
    timed! {
        let BookingsQuery { email } = query;

        let bookings = environment
            .engine
            .list_bookings_for(email.as_deref())
            .await
            .map_err(|e| to_rejection(Context::bookings(email.clone()), e))?;

        json(&SuccessResponse::Bookings { email, bookings })
    }
}

fn format_server_timing(seconds: Duration) -> String {
    format!("handler;dur={}", seconds.as_secs_f64() * 1000.0)
}
