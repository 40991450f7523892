//! In-process fakes for the sync loop's collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::{LinkKey, ScheduledEventLink, Segment};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::discord::{EventPublisher, EventRequest};
use crate::error::{FetchError, LinkStoreError, PublishError};
use crate::link_store::{LinkSession, LinkStore, NewLink};
use crate::twitch::ScheduleSource;

/// Clock frozen at a given instant.
pub struct FixedClock(pub Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

enum Scripted {
    Segments(Vec<Segment>),
    Failure(u16),
}

/// Schedule source returning canned segments per broadcaster.
#[derive(Default)]
pub struct FakeSchedule {
    responses: Mutex<HashMap<String, Scripted>>,
    calls: AtomicUsize,
}

impl FakeSchedule {
    pub fn with_segments(self, broadcaster_id: &str, segments: Vec<Segment>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(broadcaster_id.to_string(), Scripted::Segments(segments));
        self
    }

    pub fn failing(self, broadcaster_id: &str, status: u16) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(broadcaster_id.to_string(), Scripted::Failure(status));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScheduleSource for FakeSchedule {
    async fn fetch_segments(&self, broadcaster_id: &str) -> Result<Vec<Segment>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.responses.lock().unwrap().get(broadcaster_id) {
            Some(Scripted::Segments(segments)) => Ok(segments.clone()),
            Some(Scripted::Failure(status)) => Err(FetchError::Status {
                broadcaster_id: broadcaster_id.to_string(),
                status: *status,
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// Publisher that records every request and hands out sequential ids.
pub struct RecordingPublisher {
    requests: Mutex<Vec<EventRequest>>,
    next_id: AtomicU64,
    missing_guilds: Vec<u64>,
    failing_names: Vec<String>,
    /// Store that receives a competing link right after each publish.
    racing: Option<(InMemoryLinkStore, LinkKey)>,
}

impl Default for RecordingPublisher {
    fn default() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1000),
            missing_guilds: Vec::new(),
            failing_names: Vec::new(),
            racing: None,
        }
    }
}

impl RecordingPublisher {
    /// Fail with `TargetNotFound` for this guild.
    pub fn without_guild(mut self, guild_id: u64) -> Self {
        self.missing_guilds.push(guild_id);
        self
    }

    /// Reject events with this name as a Discord 500.
    pub fn failing_for(mut self, name: &str) -> Self {
        self.failing_names.push(name.to_string());
        self
    }

    /// Simulate another process linking `key` while we publish.
    pub fn racing(mut self, store: InMemoryLinkStore, key: LinkKey) -> Self {
        self.racing = Some((store, key));
        self
    }

    pub fn requests(&self) -> Vec<EventRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn create_event(&self, request: &EventRequest) -> Result<u64, PublishError> {
        if self.missing_guilds.contains(&request.guild_id) {
            return Err(PublishError::TargetNotFound(request.guild_id));
        }
        if self.failing_names.contains(&request.name) {
            return Err(PublishError::Status {
                guild_id: request.guild_id,
                status: 500,
                body: "Internal Server Error".to_string(),
            });
        }

        self.requests.lock().unwrap().push(request.clone());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        if let Some((store, key)) = &self.racing {
            store.seed_key(key.clone());
        }

        Ok(id)
    }
}

/// Link store backed by a shared map; counts writes.
#[derive(Clone, Default)]
pub struct InMemoryLinkStore {
    links: Arc<Mutex<HashMap<LinkKey, ScheduledEventLink>>>,
    writes: Arc<AtomicUsize>,
    sessions: Arc<AtomicUsize>,
}

impl InMemoryLinkStore {
    pub fn len(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: &LinkKey) -> Option<ScheduledEventLink> {
        self.links.lock().unwrap().get(key).cloned()
    }

    /// Insert a link directly, bypassing the write counter.
    pub fn seed_key(&self, key: LinkKey) {
        let now = Utc::now();
        let link = ScheduledEventLink {
            id: uuid::Uuid::new_v4(),
            source: key.source.clone(),
            source_id: key.source_id.clone(),
            guild_id: key.guild_id as i64,
            discord_event_id: 1,
            start_utc: now,
            end_utc: now,
            created_at: now,
            updated_at: now,
        };
        self.links.lock().unwrap().insert(key, link);
    }
}

#[async_trait]
impl LinkStore for InMemoryLinkStore {
    async fn session(&self) -> Result<Box<dyn LinkSession>, LinkStoreError> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl LinkSession for InMemoryLinkStore {
    async fn exists(&mut self, key: &LinkKey) -> Result<bool, LinkStoreError> {
        Ok(self.links.lock().unwrap().contains_key(key))
    }

    async fn insert(&mut self, link: &NewLink) -> Result<ScheduledEventLink, LinkStoreError> {
        let mut links = self.links.lock().unwrap();
        if links.contains_key(&link.key) {
            return Err(LinkStoreError::Conflict(link.key.clone()));
        }

        let stored = ScheduledEventLink {
            id: link.id,
            source: link.key.source.clone(),
            source_id: link.key.source_id.clone(),
            guild_id: link.key.guild_id as i64,
            discord_event_id: link.discord_event_id as i64,
            start_utc: link.start_utc,
            end_utc: link.end_utc,
            created_at: link.created_at,
            updated_at: link.created_at,
        };
        links.insert(link.key.clone(), stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);

        Ok(stored)
    }
}

/// Serve `router` on an ephemeral local port; returns its base URL.
pub async fn serve_stub(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub server");
    let addr = listener.local_addr().expect("stub server address");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub server");
    });

    format!("http://{}", addr)
}
