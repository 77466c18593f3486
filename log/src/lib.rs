use std::sync::Mutex;

use slog::Drain;
use slog::Fuse;
use slog_async::Async;
use slog_json::Json;

pub use slog::{debug, error, info, o, trace, warn, Discard, Logger};

/// Builds the root logger: JSON lines on stderr, written from a
/// background thread, tagged with the build metadata.
#[cfg(not(feature = "env_logging"))]
pub fn initialize_logger() -> Logger {
    let drain = Mutex::new(Json::default(std::io::stderr())).map(Fuse);
    let drain = Async::new(drain).build().fuse();

    Logger::root(
        drain,
        o!("version" => info::VERSION, "revision" => info::REVISION, "build_timestamp" => info::BUILD_TIMESTAMP),
    )
}

/// Builds the root logger, filtered by `RUST_LOG`, and installs it as
/// the global scope logger so library code logging through `slog-scope`
/// ends up in the same place.
#[cfg(feature = "env_logging")]
pub fn initialize_logger() -> Logger {
    let drain = Mutex::new(Json::default(std::io::stderr())).map(Fuse);
    let drain = slog_envlogger::new(drain);
    let drain = Async::new(drain).build().fuse();

    let logger = Logger::root(
        drain,
        o!("version" => info::VERSION, "revision" => info::REVISION, "build_timestamp" => info::BUILD_TIMESTAMP),
    );

    // the guard must live as long as the process
    std::mem::forget(slog_scope::set_global_logger(logger.clone()));

    logger
}

/// A logger that drops everything, for tests and tools that don’t
/// care about output.
pub fn discard_logger() -> Logger {
    Logger::root(Discard, o!())
}
