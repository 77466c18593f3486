use std::sync::Arc;

use log::Logger;

use crate::catalog::Catalog;
use crate::config::get_parsed_or;
use crate::db::Db;
use crate::engine::{ReservationEngine, DEFAULT_BOOKING_ATTEMPTS};

/// Everything a request handler needs.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub catalog: Catalog,
    pub engine: ReservationEngine,
}

impl Environment {
    pub fn new(logger: Arc<Logger>, db: Arc<dyn Db + Send + Sync>, config: Config) -> Self {
        let catalog = Catalog::new(logger.clone(), db.clone());
        let engine = ReservationEngine::new(logger.clone(), db, config.booking_attempts);

        Self {
            logger,
            catalog,
            engine,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub(crate) booking_attempts: u8,
}

impl Config {
    pub fn new(booking_attempts: u8) -> Self {
        Self { booking_attempts }
    }

    /// Reads `STUDIO_BOOKING_ATTEMPTS`, defaulting to three attempts.
    pub fn from_env() -> Self {
        Self::new(get_parsed_or(
            "STUDIO_BOOKING_ATTEMPTS",
            DEFAULT_BOOKING_ATTEMPTS,
        ))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_BOOKING_ATTEMPTS)
    }
}
