//! Error types, one per failure class.
//!
//! Only [`ConfigError`] is fatal. The others are absorbed (and logged) by the
//! caller so a single bad wallet, message or state file never stops a run.

use thiserror::Error;

/// Missing or unusable configuration. Stops the run before any work.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid display offset: {0} hours")]
    Offset(i32),
}

/// Failure fetching one wallet's activity. That wallet contributes nothing
/// this run.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("activity API returned {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed activity payload: {0}")]
    Payload(String),
}

/// Failure delivering one alert. The trade stays uncommitted and is
/// re-attempted on the next run.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("messaging API returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Failure reading or writing the state file.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
