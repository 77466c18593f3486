use std::sync::Arc;

use log::{error, warn, Logger};
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, Reply, WithStatus};
use warp::body::BodyDeserializeError;
use warp::Filter;

use crate::environment::Environment;
use crate::errors::BackendError;

pub mod admin;
mod handlers;
mod query;
mod rejection;
mod response;

pub use internal::*;

/// The largest booking request body to accept.
const MAX_CONTENT_LENGTH: u64 = 16 * 1024;

/// All of the public API, with backend errors turned into JSON responses.
pub fn make_api(
    environment: Environment,
) -> impl Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone + Send + Sync + 'static
{
    let logger = environment.logger.clone();

    // `bookable` must be tried before the `{id}` route
    make_upcoming_route(environment.clone())
        .or(make_bookable_route(environment.clone()))
        .or(make_class_route(environment.clone()))
        .or(make_book_route(environment.clone()))
        .or(make_bookings_route(environment))
        .recover(move |r| format_rejection(logger.clone(), r))
}

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        return Ok(respond(&logger, r));
    }

    // raised by `body::json` before any handler runs
    if let Some(e) = rej.find::<BodyDeserializeError>() {
        let r = rejection::Rejection::new(
            rejection::Context::request(),
            BackendError::InvalidBody(e.to_string()),
        );

        return Ok(respond(&logger, &r));
    }

    Err(rej)
}

fn respond(logger: &Logger, r: &rejection::Rejection) -> WithStatus<Json> {
    let e = &r.error;
    let status = status_code_for(e);

    if status.is_server_error() {
        error!(logger, "Backend error"; "context" => ?r.context, "error" => ?r.error, "status" => %status, "message" => %r.error);
    } else {
        warn!(logger, "Request rejected"; "context" => ?r.context, "code" => e.code(), "status" => %status, "message" => %r.error);
    }

    with_status(json(&r.flatten()), status)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        InvalidId(..) | InvalidRequester(..) | InvalidClass(..) | InvalidBody(..) => {
            StatusCode::BAD_REQUEST
        }
        ClassNotFound(..) => StatusCode::NOT_FOUND,
        DuplicateBooking | SoldOut => StatusCode::CONFLICT,
        StorageConflict | Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        Sqlx { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

mod internal {
    use warp::filters::BoxedFilter;
    use warp::path::end;
    use warp::Filter;
    use warp::Reply;
    use warp::{body, get as g, path as p, path::param as par, post, query};

    use super::{handlers, query as q, MAX_CONTENT_LENGTH};
    use crate::booking::BookingRequest;
    use crate::environment::Environment;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    macro_rules! route_filter {
        ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
        ($route_variable:ident; $first:expr, $($rest:expr),+) => (
            let $route_variable = $route_variable.and($first);
            route_filter!($route_variable; $($rest),+);
        )
    }

    macro_rules! route {
        ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
            pub fn $name(environment: Environment) -> Route {
                let $route_variable = warp::any()
                    .map(move || environment.clone());

                route_filter!($route_variable; $($filters),+);

                $route_variable.and_then(handlers::$handler)
                    .boxed()
            }
        );
    }

    route!(make_upcoming_route => upcoming, rt; p("classes"), end(), g());
    route!(make_bookable_route => bookable, rt; p!("classes" / "bookable"), end(), g());
    route!(make_class_route => class, rt; p("classes"), par::<String>(), end(), g());
    route!(make_book_route => book, rt; p("bookings"), end(), post(), body::content_length_limit(MAX_CONTENT_LENGTH), body::json::<BookingRequest>());
    route!(make_bookings_route => bookings, rt; p("bookings"), end(), g(), query::<q::BookingsQuery>());
}
