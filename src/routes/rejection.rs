use serde::Serialize;
use uuid::Uuid;
use warp::reject;

use crate::errors::BackendError;

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
}

impl Rejection {
    pub fn new(context: Context, error: BackendError) -> Self {
        Rejection { context, error }
    }

    pub fn flatten(&self) -> FlattenedRejection {
        FlattenedRejection {
            context: self.context.clone(),
            error: self.error.code(),
            message: format!("{}", self.error),
        }
    }
}

impl reject::Reject for Rejection {}

/// Wraps a backend error so warp carries it to `format_rejection`.
pub fn to_rejection(context: Context, error: BackendError) -> reject::Rejection {
    reject::custom(Rejection::new(context, error))
}

#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    #[serde(flatten)]
    pub(crate) context: Context,
    pub(crate) error: &'static str,
    pub(crate) message: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Context {
    Bookable,
    Book { class_id: Uuid, email: String },
    Bookings { email: Option<String> },
    Class { id: String },
    Request,
    Upcoming,
}

impl Context {
    pub fn bookable() -> Context {
        Context::Bookable
    }

    pub fn book(class_id: Uuid, email: String) -> Context {
        Context::Book { class_id, email }
    }

    pub fn bookings(email: Option<String>) -> Context {
        Context::Bookings { email }
    }

    pub fn class(id: String) -> Context {
        Context::Class { id }
    }

    pub fn request() -> Context {
        Context::Request
    }

    pub fn upcoming() -> Context {
        Context::Upcoming
    }
}
