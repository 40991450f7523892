//! Domain types shared between the schedule sync service and its tooling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Source tag recorded on links created from a Twitch broadcaster schedule.
pub const SOURCE_TWITCH: &str = "twitch";

/// Longest source item id a link can store, in characters.
pub const MAX_SOURCE_ID_CHARS: usize = 256;

/// One normalized scheduled broadcast from the source schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub title: String,
    /// Empty when the broadcaster did not pick a category.
    pub category_name: String,
}

impl Segment {
    pub fn has_category(&self) -> bool {
        !self.category_name.trim().is_empty()
    }
}

/// Persisted link between a source segment and the Discord event created for it.
///
/// Field order matches the `scheduled_event_links` columns exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
pub struct ScheduledEventLink {
    pub id: Uuid,
    pub source: String,
    pub source_id: String,
    pub guild_id: i64,
    pub discord_event_id: i64,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Uniqueness key of a link: at most one link per source item per target guild.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkKey {
    pub source: String,
    pub source_id: String,
    pub guild_id: u64,
}

impl LinkKey {
    pub fn new(source: impl Into<String>, source_id: impl Into<String>, guild_id: u64) -> Self {
        Self {
            source: source.into(),
            source_id: source_id.into(),
            guild_id,
        }
    }

    /// Key for a Twitch segment synced into `guild_id`.
    pub fn twitch(segment_id: impl Into<String>, guild_id: u64) -> Self {
        Self::new(SOURCE_TWITCH, segment_id, guild_id)
    }
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} in guild {}", self.source, self.source_id, self.guild_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_blank_category_is_not_a_category() {
        let start = Utc.with_ymd_and_hms(2026, 1, 10, 18, 0, 0).unwrap();
        let mut segment = Segment {
            id: "seg-1".to_string(),
            start_utc: start,
            end_utc: start + chrono::Duration::hours(3),
            title: "Speedruns".to_string(),
            category_name: "   ".to_string(),
        };
        assert!(!segment.has_category());

        segment.category_name = "Celeste".to_string();
        assert!(segment.has_category());
    }

    #[test]
    fn test_twitch_key_display() {
        let key = LinkKey::twitch("abc", 42);
        assert_eq!(key.source, SOURCE_TWITCH);
        assert_eq!(key.to_string(), "twitch/abc in guild 42");
    }

    #[test]
    fn test_segment_serde() {
        let start = Utc.with_ymd_and_hms(2026, 1, 10, 18, 0, 0).unwrap();
        let segment = Segment {
            id: "seg-1".to_string(),
            start_utc: start,
            end_utc: start,
            title: "t".to_string(),
            category_name: String::new(),
        };

        let json = serde_json::to_string(&segment).unwrap();
        let parsed: Segment = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, segment);
    }
}
