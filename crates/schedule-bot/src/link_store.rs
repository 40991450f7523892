//! Durable mapping from source segments to the Discord events created for them.
//!
//! The store is opened once per processing unit (one channel cycle) through
//! [`LinkStore::session`]; a session owns its connection and is never shared
//! between concurrent cycles. Uniqueness of `(source, source_id, guild_id)` is
//! enforced by the caller's pre-check *and* by the unique index, which surfaces
//! here as [`LinkStoreError::Conflict`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::deadpool::Object;
use diesel_async::AsyncPgConnection;
use shared_types::{LinkKey, ScheduledEventLink, Segment, MAX_SOURCE_ID_CHARS, SOURCE_TWITCH};
use uuid::Uuid;

use crate::db::{self, DbPool};
use crate::error::LinkStoreError;
use crate::models::NewScheduledEventLink;

/// A link about to be stored for a freshly created Discord event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub id: Uuid,
    pub key: LinkKey,
    pub discord_event_id: u64,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl NewLink {
    /// Link for a Twitch segment; times are copied from the segment.
    pub fn for_twitch_segment(
        segment: &Segment,
        guild_id: u64,
        discord_event_id: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: LinkKey::new(SOURCE_TWITCH, segment.id.clone(), guild_id),
            discord_event_id,
            start_utc: segment.start_utc,
            end_utc: segment.end_utc,
            created_at: now,
        }
    }

    fn to_row(&self) -> Result<NewScheduledEventLink, LinkStoreError> {
        check_key(&self.key)?;
        Ok(NewScheduledEventLink {
            id: self.id,
            source: self.key.source.clone(),
            source_id: self.key.source_id.clone(),
            guild_id: to_bigint(self.key.guild_id)?,
            discord_event_id: to_bigint(self.discord_event_id)?,
            start_utc: self.start_utc,
            end_utc: self.end_utc,
            created_at: self.created_at,
            updated_at: self.created_at,
        })
    }
}

/// Whether `key` can be stored at all. Checked before publishing so an
/// unstorable segment never produces a Discord event.
pub fn check_key(key: &LinkKey) -> Result<(), LinkStoreError> {
    let len = key.source_id.chars().count();
    if len > MAX_SOURCE_ID_CHARS {
        return Err(LinkStoreError::SourceIdTooLong(len));
    }
    to_bigint(key.guild_id).map(|_| ())
}

fn to_bigint(id: u64) -> Result<i64, LinkStoreError> {
    i64::try_from(id).map_err(|_| LinkStoreError::IdOutOfRange(id))
}

#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Open a session scoped to one processing unit.
    async fn session(&self) -> Result<Box<dyn LinkSession>, LinkStoreError>;
}

#[async_trait]
pub trait LinkSession: Send {
    async fn exists(&mut self, key: &LinkKey) -> Result<bool, LinkStoreError>;

    /// Fails with [`LinkStoreError::Conflict`] when the key is already linked.
    async fn insert(&mut self, link: &NewLink) -> Result<ScheduledEventLink, LinkStoreError>;
}

/// Postgres-backed link store.
#[derive(Clone)]
pub struct PgLinkStore {
    pool: DbPool,
}

impl PgLinkStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list_for_guild(
        &self,
        guild_id: u64,
        limit: i64,
    ) -> Result<Vec<ScheduledEventLink>, LinkStoreError> {
        let mut conn = self.pool.get().await?;
        let links =
            db::scheduled_event_links::list_for_guild(&mut conn, to_bigint(guild_id)?, limit)
                .await?;
        Ok(links)
    }

    pub async fn count(&self) -> Result<i64, LinkStoreError> {
        let mut conn = self.pool.get().await?;
        Ok(db::scheduled_event_links::count_all(&mut conn).await?)
    }
}

#[async_trait]
impl LinkStore for PgLinkStore {
    async fn session(&self) -> Result<Box<dyn LinkSession>, LinkStoreError> {
        let conn = self.pool.get().await?;
        Ok(Box::new(PgLinkSession { conn }))
    }
}

/// One pooled connection, held for the duration of a channel cycle.
pub struct PgLinkSession {
    conn: Object<AsyncPgConnection>,
}

#[async_trait]
impl LinkSession for PgLinkSession {
    async fn exists(&mut self, key: &LinkKey) -> Result<bool, LinkStoreError> {
        let guild_id = to_bigint(key.guild_id)?;
        let found =
            db::scheduled_event_links::exists(&mut self.conn, &key.source, &key.source_id, guild_id)
                .await?;
        Ok(found)
    }

    async fn insert(&mut self, link: &NewLink) -> Result<ScheduledEventLink, LinkStoreError> {
        let row = link.to_row()?;

        match db::scheduled_event_links::insert(&mut self.conn, &row).await {
            Ok(Some(stored)) => Ok(stored),
            Ok(None) => Err(LinkStoreError::Conflict(link.key.clone())),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Err(LinkStoreError::Conflict(link.key.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
