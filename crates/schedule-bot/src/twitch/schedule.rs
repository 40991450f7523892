use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use shared_types::{Segment, MAX_SOURCE_ID_CHARS};

use super::auth::AccessTokenProvider;
use crate::error::FetchError;

/// Source of upcoming broadcast segments.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Upcoming segments for a broadcaster. An unpublished schedule is an
    /// empty list, not an error.
    async fn fetch_segments(&self, broadcaster_id: &str) -> Result<Vec<Segment>, FetchError>;
}

/// `GET /schedule` client for the Helix API.
pub struct TwitchScheduleClient<A> {
    http: reqwest::Client,
    helix_base_url: String,
    client_id: String,
    tokens: A,
}

impl<A: AccessTokenProvider> TwitchScheduleClient<A> {
    pub fn new(http: reqwest::Client, helix_base_url: &str, client_id: &str, tokens: A) -> Self {
        Self {
            http,
            helix_base_url: helix_base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            tokens,
        }
    }
}

#[async_trait]
impl<A: AccessTokenProvider> ScheduleSource for TwitchScheduleClient<A> {
    async fn fetch_segments(&self, broadcaster_id: &str) -> Result<Vec<Segment>, FetchError> {
        let token = self.tokens.access_token().await?;

        let response = self
            .http
            .get(format!("{}/schedule", self.helix_base_url))
            .query(&[("broadcaster_id", broadcaster_id)])
            .header("Client-Id", &self.client_id)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::info!(
                "No Twitch schedule found for broadcaster {} (404), treating as empty",
                broadcaster_id
            );
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                broadcaster_id: broadcaster_id.to_string(),
                status: status.as_u16(),
            });
        }

        let payload: ScheduleResponse = response.json().await?;
        let segments = normalize_segments(payload);

        tracing::info!(
            "Fetched {} schedule segments for broadcaster {}",
            segments.len(),
            broadcaster_id
        );

        Ok(segments)
    }
}

/// Body of `GET /helix/schedule`.
#[derive(Debug, Default, Deserialize)]
pub struct ScheduleResponse {
    #[serde(default)]
    data: Option<ScheduleData>,
}

#[derive(Debug, Deserialize)]
struct ScheduleData {
    #[serde(default)]
    segments: Option<Vec<RawSegment>>,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    id: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    title: Option<String>,
    category: Option<RawCategory>,
}

#[derive(Debug, Deserialize)]
struct RawCategory {
    name: Option<String>,
}

/// Map the wire payload to [`Segment`]s.
///
/// Entries with a blank or over-long id are dropped. Entries whose times do not parse are
/// dropped with a warning; one bad entry never fails the whole fetch.
pub fn normalize_segments(payload: ScheduleResponse) -> Vec<Segment> {
    let raw = payload
        .data
        .and_then(|data| data.segments)
        .unwrap_or_default();

    raw.into_iter()
        .filter_map(|segment| {
            let id = segment.id.unwrap_or_default().trim().to_string();
            if id.is_empty() {
                return None;
            }
            if id.chars().count() > MAX_SOURCE_ID_CHARS {
                tracing::warn!(
                    "Discarding schedule segment with a {}-character id",
                    id.chars().count()
                );
                return None;
            }

            let start_utc = parse_time(segment.start_time.as_deref());
            let end_utc = parse_time(segment.end_time.as_deref());
            let (Some(start_utc), Some(end_utc)) = (start_utc, end_utc) else {
                tracing::warn!(
                    "Discarding schedule segment {}: unparseable start/end time",
                    id
                );
                return None;
            };

            Some(Segment {
                id,
                start_utc,
                end_utc,
                title: segment.title.unwrap_or_default(),
                category_name: segment.category.and_then(|c| c.name).unwrap_or_default(),
            })
        })
        .collect()
}

fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
