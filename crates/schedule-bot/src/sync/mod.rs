//! Schedule reconciliation: the sync loop and its read-only observer.
//!
//! Both workers share the same gate, fetch and window steps; only the sync
//! worker publishes events and records links.

mod dry_run;
mod window;
mod worker;

pub use dry_run::{ScheduleDryRunWorker, PREVIEW_LIMIT};
pub use window::SyncWindow;
pub use worker::ScheduleSyncWorker;

use chrono::{DateTime, Utc};
use shared_types::Segment;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::ChannelSettings;
use crate::discord::EventRequest;
use crate::twitch::ScheduleSource;

/// How a channel's cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Synced,
    Disabled,
    NoBroadcaster,
    FetchFailed,
    StoreUnavailable,
    Cancelled,
}

/// Counters for one channel in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport {
    pub channel: String,
    pub status: ChannelStatus,
    pub fetched: usize,
    pub in_window: usize,
    pub already_linked: usize,
    pub created: usize,
    pub conflicts: usize,
    pub failed: usize,
}

impl ChannelReport {
    fn new(channel: &str, status: ChannelStatus) -> Self {
        Self {
            channel: channel.to_string(),
            status,
            fetched: 0,
            in_window: 0,
            already_linked: 0,
            created: 0,
            conflicts: 0,
            failed: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub channels: Vec<ChannelReport>,
}

impl CycleReport {
    pub fn created(&self) -> usize {
        self.channels.iter().map(|c| c.created).sum()
    }

    pub fn already_linked(&self) -> usize {
        self.channels.iter().map(|c| c.already_linked).sum()
    }

    pub fn conflicts(&self) -> usize {
        self.channels.iter().map(|c| c.conflicts).sum()
    }

    pub fn failed(&self) -> usize {
        self.channels.iter().map(|c| c.failed).sum()
    }

    pub fn in_window(&self) -> usize {
        self.channels.iter().map(|c| c.in_window).sum()
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelReport> {
        self.channels.iter().find(|c| c.channel == name)
    }

    /// Every channel reported as disabled, nothing fetched.
    fn all_disabled(channels: &[ChannelSettings]) -> Self {
        Self {
            channels: channels
                .iter()
                .map(|c| ChannelReport::new(&c.name, ChannelStatus::Disabled))
                .collect(),
        }
    }
}

/// In-window segments of one channel, ready for processing.
struct ChannelSegments {
    window: SyncWindow,
    fetched: usize,
    segments: Vec<Segment>,
}

/// Gate, fetch and window-filter one channel.
///
/// `Err` carries the status for a channel that yields nothing this cycle.
async fn fetch_channel(
    source: &dyn ScheduleSource,
    channel: &ChannelSettings,
    default_days: u32,
    now: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<ChannelSegments, ChannelStatus> {
    if !channel.enabled {
        tracing::info!("Channel disabled, skipping");
        return Err(ChannelStatus::Disabled);
    }
    if !channel.has_broadcaster() {
        tracing::warn!("Channel has no broadcaster_id configured, skipping");
        return Err(ChannelStatus::NoBroadcaster);
    }

    let fetched = tokio::select! {
        _ = cancel.cancelled() => return Err(ChannelStatus::Cancelled),
        result = source.fetch_segments(channel.broadcaster_id.trim()) => result,
    };

    let segments = match fetched {
        Ok(segments) => segments,
        Err(e) => {
            tracing::error!("Failed to fetch Twitch schedule: {}", e);
            return Err(ChannelStatus::FetchFailed);
        }
    };

    let window = SyncWindow::starting_at(now, channel.max_days_ahead(default_days));
    let fetched = segments.len();
    let segments = window.select(segments);

    Ok(ChannelSegments {
        window,
        fetched,
        segments,
    })
}

/// Wait for `interval`. Returns `true` when cancelled first.
pub async fn sleep_or_cancel(interval: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(interval) => false,
    }
}

/// Destination event for a segment of `channel`.
pub fn event_request(channel: &ChannelSettings, segment: &Segment) -> EventRequest {
    EventRequest {
        guild_id: channel.target_guild_id,
        name: event_name(channel, segment),
        description: event_description(channel, segment),
        location: channel.location_url().to_string(),
        start_utc: segment.start_utc,
        end_utc: segment.end_utc,
    }
}

fn event_name(channel: &ChannelSettings, segment: &Segment) -> String {
    if segment.title.trim().is_empty() {
        format!("{} stream", channel.name)
    } else {
        segment.title.clone()
    }
}

fn event_description(channel: &ChannelSettings, segment: &Segment) -> String {
    if segment.has_category() {
        format!("Game: {} ({})", segment.category_name, channel.name)
    } else {
        format!("Twitch Stream ({})", channel.name)
    }
}
