//! The reconciliation loop.
//!
//! Each cycle walks the configured channels one at a time: fetch the schedule,
//! keep the segments inside the sync window, and for every segment that has no
//! link yet create a Discord event and record the link. A publish that
//! succeeded but whose link insert loses a race is reported as a conflict.

use anyhow::{Context, Result};
use shared_types::{LinkKey, Segment};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{
    event_request, fetch_channel, sleep_or_cancel, ChannelReport, ChannelStatus, CycleReport,
};
use crate::clock::{Clock, SystemClock};
use crate::config::{ChannelSettings, ScheduleSyncSettings};
use crate::discord::EventPublisher;
use crate::error::LinkStoreError;
use crate::link_store::{check_key, LinkSession, LinkStore, NewLink};
use crate::twitch::ScheduleSource;

enum SegmentOutcome {
    AlreadyLinked,
    Created,
    Conflict,
}

pub struct ScheduleSyncWorker {
    source: Arc<dyn ScheduleSource>,
    publisher: Arc<dyn EventPublisher>,
    links: Arc<dyn LinkStore>,
    channels: Vec<ChannelSettings>,
    enabled: bool,
    interval: Duration,
    default_days: u32,
    clock: Arc<dyn Clock>,
}

impl ScheduleSyncWorker {
    pub fn new(
        settings: &ScheduleSyncSettings,
        channels: Vec<ChannelSettings>,
        source: Arc<dyn ScheduleSource>,
        publisher: Arc<dyn EventPublisher>,
        links: Arc<dyn LinkStore>,
    ) -> Self {
        Self {
            source,
            publisher,
            links,
            channels,
            enabled: settings.enabled,
            interval: settings.interval(),
            default_days: settings.max_days_ahead,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run cycles until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        if !self.enabled {
            tracing::info!("Schedule sync disabled, not starting");
            return;
        }

        tracing::info!(
            "Schedule sync started (interval: {:?}, {} channel(s), {} days ahead)",
            self.interval,
            self.channels.len(),
            self.default_days
        );

        loop {
            let report = self.run_cycle(&cancel).await;
            tracing::info!(
                "Sync cycle finished: {} in window, {} created, {} already linked, {} conflicts, {} failed",
                report.in_window(),
                report.created(),
                report.already_linked(),
                report.conflicts(),
                report.failed()
            );

            if cancel.is_cancelled() || sleep_or_cancel(self.interval, &cancel).await {
                break;
            }
        }

        tracing::info!("Schedule sync stopped");
    }

    /// One pass over every channel.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        if !self.enabled {
            tracing::info!("Schedule sync disabled, skipping all channels");
            return CycleReport::all_disabled(&self.channels);
        }

        let mut report = CycleReport::default();

        for channel in &self.channels {
            if cancel.is_cancelled() {
                break;
            }

            let span = tracing::info_span!(
                "channel",
                name = %channel.name,
                broadcaster_id = %channel.broadcaster_id,
                guild_id = channel.target_guild_id
            );
            let channel_report = self.sync_channel(channel, cancel).instrument(span).await;
            report.channels.push(channel_report);
        }

        report
    }

    async fn sync_channel(
        &self,
        channel: &ChannelSettings,
        cancel: &CancellationToken,
    ) -> ChannelReport {
        let now = self.clock.now();
        let fetched = fetch_channel(
            self.source.as_ref(),
            channel,
            self.default_days,
            now,
            cancel,
        )
        .await;

        let batch = match fetched {
            Ok(batch) => batch,
            Err(status) => return ChannelReport::new(&channel.name, status),
        };

        let mut report = ChannelReport::new(&channel.name, ChannelStatus::Synced);
        report.fetched = batch.fetched;
        report.in_window = batch.segments.len();

        tracing::debug!(
            "{} of {} segments within the next {} days",
            batch.segments.len(),
            batch.fetched,
            batch.window.days
        );

        if batch.segments.is_empty() {
            return report;
        }

        let mut session = match self.links.session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Link store unavailable: {}", e);
                report.status = ChannelStatus::StoreUnavailable;
                return report;
            }
        };

        for segment in &batch.segments {
            if cancel.is_cancelled() {
                report.status = ChannelStatus::Cancelled;
                break;
            }

            match self.sync_segment(session.as_mut(), channel, segment).await {
                Ok(SegmentOutcome::AlreadyLinked) => report.already_linked += 1,
                Ok(SegmentOutcome::Created) => report.created += 1,
                Ok(SegmentOutcome::Conflict) => report.conflicts += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(segment_id = %segment.id, "Failed to sync segment: {:#}", e);
                }
            }
        }

        report
    }

    async fn sync_segment(
        &self,
        session: &mut dyn LinkSession,
        channel: &ChannelSettings,
        segment: &Segment,
    ) -> Result<SegmentOutcome> {
        let key = LinkKey::twitch(&segment.id, channel.target_guild_id);
        check_key(&key).context("Segment cannot be linked")?;

        if session.exists(&key).await.context("Link lookup failed")? {
            tracing::debug!(segment_id = %segment.id, "Already linked, skipping");
            return Ok(SegmentOutcome::AlreadyLinked);
        }

        let request = event_request(channel, segment);
        let event_id = self
            .publisher
            .create_event(&request)
            .await
            .context("Failed to create Discord scheduled event")?;

        let link = NewLink::for_twitch_segment(
            segment,
            channel.target_guild_id,
            event_id,
            self.clock.now(),
        );

        match session.insert(&link).await {
            Ok(_) => {
                tracing::info!(
                    "Created Discord event {} for segment {} starting {}",
                    event_id,
                    segment.id,
                    segment.start_utc
                );
                Ok(SegmentOutcome::Created)
            }
            Err(LinkStoreError::Conflict(key)) => {
                tracing::warn!(
                    "Link for {} was stored concurrently; Discord event {} stays unlinked",
                    key,
                    event_id
                );
                Ok(SegmentOutcome::Conflict)
            }
            Err(e) => Err(e).with_context(|| {
                format!("Discord event {} created but its link was not stored", event_id)
            }),
        }
    }
}
