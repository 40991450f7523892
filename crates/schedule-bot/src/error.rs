//! Error types for the service boundaries.
//!
//! Each external collaborator (token endpoint, schedule API, Discord, the link
//! store, configuration) gets its own enum so the sync loop can tell a benign
//! outcome such as [`LinkStoreError::Conflict`] apart from a real failure.

use diesel_async::pooled_connection::deadpool::PoolError;
use shared_types::LinkKey;
use thiserror::Error;

/// Failure to obtain a Twitch app access token.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("token endpoint returned HTTP {0}")]
    Status(u16),

    #[error("token endpoint returned an empty access token")]
    EmptyToken,

    #[error("token endpoint returned an unusable expires_in of {0} seconds")]
    InvalidExpiry(i64),
}

/// Failure to read a broadcaster schedule.
///
/// A missing schedule (HTTP 404) is not an error; the client returns an empty
/// segment list instead.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to obtain Twitch app token: {0}")]
    Auth(#[from] TokenError),

    #[error("schedule request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("schedule request for broadcaster {broadcaster_id} returned HTTP {status}")]
    Status { broadcaster_id: String, status: u16 },
}

/// Failure to create a Discord scheduled event.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("guild {0} not found or not accessible; is the bot a member of the guild?")]
    TargetNotFound(u64),

    #[error("create event request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("create event in guild {guild_id} returned HTTP {status}: {body}")]
    Status {
        guild_id: u64,
        status: u16,
        body: String,
    },

    #[error("create event response carried an invalid id: {0:?}")]
    InvalidResponse(String),
}

/// Link store failures.
#[derive(Debug, Error)]
pub enum LinkStoreError {
    /// The uniqueness key is already taken, usually by a concurrent cycle.
    #[error("link already exists for {0}")]
    Conflict(LinkKey),

    #[error("database connection unavailable")]
    ConnectionPool(#[source] PoolError),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("identifier {0} does not fit a BIGINT column")]
    IdOutOfRange(u64),

    #[error("source id of {0} characters exceeds the stored maximum")]
    SourceIdTooLong(usize),
}

impl From<PoolError> for LinkStoreError {
    fn from(err: PoolError) -> Self {
        LinkStoreError::ConnectionPool(err)
    }
}

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid settings: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("configuration error: {0}")]
    Missing(String),
}

impl ConfigError {
    /// Create a config error for a required value that is empty or absent
    pub fn missing(key: &str) -> Self {
        ConfigError::Missing(format!("{} must be set", key))
    }
}
