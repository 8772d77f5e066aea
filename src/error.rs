use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

/// Failure reported by a page fetcher.
///
/// The tracker treats every variant the same way (degrade and retry on the
/// next tick); the split only matters for logs and status display.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum FetchError {
    #[display("product page unreachable")]
    Unreachable,
    #[display("product page not found")]
    NotFound,
    #[display("failed to extract title or price from page")]
    ParseFailure,
    #[display("fetch timed out")]
    Timeout,
}

#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum NotifyError {
    #[display("notification endpoint unreachable")]
    Unreachable,
    #[display("notification rejected by provider")]
    Rejected,
}

#[derive(Debug, Display, Error)]
pub enum StorageError {
    #[display("database migration failed")]
    Migration,
    #[display("failed to insert data")]
    Insert,
    #[display("failed to query data")]
    Query,
}

#[derive(Debug, Display, Error)]
pub enum TrackerError {
    #[display("tracker for {target_id} already started (state: {state})")]
    AlreadyStarted { target_id: String, state: String },
}

#[derive(Debug, Display, Error)]
pub enum SupervisorError {
    #[display("target {target_id} is already being tracked")]
    AlreadyTracking { target_id: String },
    #[display("target {target_id} is not tracked")]
    NotFound { target_id: String },
    #[display("failed to start tracker")]
    Start,
    #[display("failed to load history")]
    History,
}
