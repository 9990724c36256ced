//! Error types for the county router.
//!
//! - [`FetchError`] - Top-level error for a fetch cycle
//! - [`RoutingError`] - Identifier could not be routed to a state
//! - [`HostError`] - A call into the host (store, sync process) failed
//! - [`CoercionError`] - A handler's rows did not fit the output dtypes

use std::path::PathBuf;
use thiserror::Error;

use crate::handler::HandlerKeys;

/// A boxed error type for host implementations that wrap foreign errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum RoutingError {
    /// The identifier has no two-digit state prefix.
    #[error("malformed FIPS code {0:?}: expected a two-digit state prefix")]
    MalformedFips(String),
}

#[derive(Error, Debug)]
pub enum StateTableError {
    #[error("failed to read state table: {0}")]
    Csv(#[from] csv::Error),

    #[error("state prefix {prefix} is listed twice ({first} and {second})")]
    DuplicatePrefix {
        prefix: String,
        first: String,
        second: String,
    },
}

#[derive(Error, Debug)]
pub enum HostError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The host command line is empty.
    #[error("no host command configured")]
    EmptyCommand,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(BoxError),
}

#[derive(Error, Debug, PartialEq)]
pub enum CoercionError {
    #[error("row {row} is missing column {column:?}")]
    MissingColumn { row: usize, column: String },

    #[error("row {row}: cannot read {value} as {column}")]
    BadValue {
        row: usize,
        column: &'static str,
        value: String,
    },
}

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("prompt failed: {0}")]
    Prompt(#[source] BoxError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that abort a fetch cycle.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("failed to provision {keys}: {source}")]
    Provision {
        keys: HandlerKeys,
        #[source]
        source: HostError,
    },

    /// The synchronizer could not be run at all.
    #[error("failed to start sync: {0}")]
    Sync(#[source] HostError),

    /// The synchronizer ran and reported failure.
    #[error("failed to sync states' pipes (exit code {code:?})")]
    SyncFailed { code: Option<i32> },

    #[error("failed to retrieve {keys}: {source}")]
    Retrieval {
        keys: HandlerKeys,
        #[source]
        source: HostError,
    },

    #[error("rows from {keys} do not fit the output columns: {source}")]
    Coercion {
        keys: HandlerKeys,
        #[source]
        source: CoercionError,
    },
}
