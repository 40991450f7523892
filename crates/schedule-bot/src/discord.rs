//! Discord guild scheduled events (REST v10).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::DiscordSettings;
use crate::error::PublishError;

pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 1000;
pub const MAX_LOCATION_CHARS: usize = 100;

/// GUILD_ONLY
const PRIVACY_LEVEL_GUILD_ONLY: u8 = 2;
/// EXTERNAL
const ENTITY_TYPE_EXTERNAL: u8 = 3;

/// A destination event to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRequest {
    pub guild_id: u64,
    pub name: String,
    pub description: String,
    pub location: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Create the event and return its snowflake id. Not idempotent.
    async fn create_event(&self, request: &EventRequest) -> Result<u64, PublishError>;
}

#[derive(Debug, Serialize)]
struct CreateScheduledEvent<'a> {
    name: String,
    privacy_level: u8,
    scheduled_start_time: DateTime<Utc>,
    scheduled_end_time: DateTime<Utc>,
    description: String,
    entity_type: u8,
    entity_metadata: EntityMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct EntityMetadata<'a> {
    location: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedScheduledEvent {
    id: String,
}

impl<'a> CreateScheduledEvent<'a> {
    fn from_request(request: &'a EventRequest, location: &'a str) -> Self {
        Self {
            name: truncate_chars(&request.name, MAX_NAME_CHARS),
            privacy_level: PRIVACY_LEVEL_GUILD_ONLY,
            scheduled_start_time: request.start_utc,
            scheduled_end_time: request.end_utc,
            description: truncate_chars(&request.description, MAX_DESCRIPTION_CHARS),
            entity_type: ENTITY_TYPE_EXTERNAL,
            entity_metadata: EntityMetadata { location },
        }
    }
}

/// Bot-token client for `POST /guilds/{guild_id}/scheduled-events`.
pub struct DiscordScheduledEventClient {
    http: reqwest::Client,
    api_base_url: String,
    token: String,
}

impl DiscordScheduledEventClient {
    pub fn new(http: reqwest::Client, settings: &DiscordSettings) -> Self {
        Self {
            http,
            api_base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
        }
    }
}

#[async_trait]
impl EventPublisher for DiscordScheduledEventClient {
    async fn create_event(&self, request: &EventRequest) -> Result<u64, PublishError> {
        let location = truncate_chars(&request.location, MAX_LOCATION_CHARS);
        let body = CreateScheduledEvent::from_request(request, &location);

        let response = self
            .http
            .post(format!(
                "{}/guilds/{}/scheduled-events",
                self.api_base_url, request.guild_id
            ))
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::FORBIDDEN {
            return Err(PublishError::TargetNotFound(request.guild_id));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Status {
                guild_id: request.guild_id,
                status: status.as_u16(),
                body,
            });
        }

        let created: CreatedScheduledEvent = response.json().await?;
        created
            .id
            .parse::<u64>()
            .map_err(|_| PublishError::InvalidResponse(created.id))
    }
}

/// First `max` characters of `value`; never splits a code point.
pub fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((end, _)) => value[..end].to_string(),
        None => value.to_string(),
    }
}
