//! Read-only [`EventSource`] implementations over the device's native
//! SQLite stores: the call history database and the messages database.
//!
//! Both stores are owned and written by other processes; we open them
//! read-only and connect lazily, so a missing or locked file surfaces as
//! a recoverable [`SourceError`] on each poll instead of failing startup.
//!
//! [`EventSource`]: aside_core::EventSource
//! [`SourceError`]: aside_core::SourceError

mod call;
mod message;

pub use call::CallHistorySource;
pub use message::MessageStoreSource;

use aside_core::SourceError;

/// Classify an sqlx failure: connection-level problems are
/// `Unavailable` (the store will likely come back), everything else is a
/// `Query` failure.
pub(crate) fn map_sqlx(e: sqlx::Error) -> SourceError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Configuration(_) => SourceError::Unavailable(e.to_string()),
        other => SourceError::Query(other.to_string()),
    }
}

pub(crate) fn read_only_pool(
    path: &std::path::Path,
) -> sqlx::Pool<sqlx::Sqlite> {
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    let options = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true);

    // connect_lazy: the first poll, not construction, pays for (and can
    // recover from) a missing file.
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_lazy_with(options)
}
