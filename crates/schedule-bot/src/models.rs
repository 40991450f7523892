// Database models for Diesel
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

/// Insertable row for scheduled_event_links
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::scheduled_event_links)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewScheduledEventLink {
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
