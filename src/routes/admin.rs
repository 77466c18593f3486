use std::convert::Infallible;
use std::sync::Arc;

use futures::future::BoxFuture;
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, Reply};
use warp::Filter;

use super::response::SuccessResponse;

pub fn make_healthz_route(
) -> impl warp::Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone {
    warp::path("healthz").and(warp::get()).map(|| {
        json(&SuccessResponse::Healthz {
            revision: info::REVISION,
            timestamp: info::BUILD_TIMESTAMP,
            version: info::VERSION,
        })
    })
}

pub type TerminationFunctionWrapper = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

pub fn make_termination_route(
    terminate: TerminationFunctionWrapper,
) -> impl warp::Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone {
    let handler = move || {
        let terminate = terminate.clone();

        async move {
            terminate().await;
            Ok::<_, Infallible>(StatusCode::NO_CONTENT)
        }
    };

    warp::path("terminate").and(warp::post()).and_then(handler)
}
