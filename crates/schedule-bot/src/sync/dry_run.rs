//! Read-only observer: fetches and filters like the sync loop, then only logs.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{fetch_channel, sleep_or_cancel, ChannelReport, ChannelStatus, CycleReport};
use crate::clock::{Clock, SystemClock};
use crate::config::{ChannelSettings, ScheduleSyncSettings};
use crate::twitch::ScheduleSource;

/// Segments logged per channel and cycle.
pub const PREVIEW_LIMIT: usize = 5;

pub struct ScheduleDryRunWorker {
    source: Arc<dyn ScheduleSource>,
    channels: Vec<ChannelSettings>,
    enabled: bool,
    interval: Duration,
    default_days: u32,
    clock: Arc<dyn Clock>,
}

impl ScheduleDryRunWorker {
    pub fn new(
        settings: &ScheduleSyncSettings,
        channels: Vec<ChannelSettings>,
        source: Arc<dyn ScheduleSource>,
    ) -> Self {
        Self {
            source,
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

    pub async fn run(&self, cancel: CancellationToken) {
        if !self.enabled {
            tracing::info!("Schedule sync disabled, dry-run observer not starting");
            return;
        }

        tracing::info!(
            "Dry-run observer started (interval: {:?}, {} channel(s))",
            self.interval,
            self.channels.len()
        );

        loop {
            self.run_cycle(&cancel).await;

            if cancel.is_cancelled() || sleep_or_cancel(self.interval, &cancel).await {
                break;
            }
        }

        tracing::info!("Dry-run observer stopped");
    }

    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        if !self.enabled {
            tracing::info!("Schedule sync disabled, dry-run skipping all channels");
            return CycleReport::all_disabled(&self.channels);
        }

        let mut report = CycleReport::default();

        for channel in &self.channels {
            if cancel.is_cancelled() {
                break;
            }

            let span = tracing::info_span!(
                "dry_run",
                name = %channel.name,
                broadcaster_id = %channel.broadcaster_id
            );
            report
                .channels
                .push(self.observe_channel(channel, cancel).instrument(span).await);
        }

        report
    }

    async fn observe_channel(
        &self,
        channel: &ChannelSettings,
        cancel: &CancellationToken,
    ) -> ChannelReport {
        let now = self.clock.now();
        let batch = match fetch_channel(
            self.source.as_ref(),
            channel,
            self.default_days,
            now,
            cancel,
        )
        .await
        {
            Ok(batch) => batch,
            Err(status) => return ChannelReport::new(&channel.name, status),
        };

        tracing::info!(
            "DRY-RUN: {} segments in next {} days",
            batch.segments.len(),
            batch.window.days
        );

        for segment in batch.segments.iter().take(PREVIEW_LIMIT) {
            tracing::info!(
                "DRY-RUN: {} | {} -> {} | {} | {}",
                segment.id,
                segment.start_utc,
                segment.end_utc,
                segment.title,
                segment.category_name
            );
        }

        let mut report = ChannelReport::new(&channel.name, ChannelStatus::Synced);
        report.fetched = batch.fetched;
        report.in_window = batch.segments.len();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSchedule, FixedClock};
    use chrono::{DateTime, TimeZone, Utc};
    use shared_types::Segment;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 7, 12, 0, 0).unwrap()
    }

    fn segment(id: &str, days_ahead: i64) -> Segment {
        let start = now() + chrono::Duration::days(days_ahead);
        Segment {
            id: id.to_string(),
            start_utc: start,
            end_utc: start + chrono::Duration::hours(1),
            title: "t".to_string(),
            category_name: String::new(),
        }
    }

    fn channel() -> ChannelSettings {
        ChannelSettings {
            name: "mortys".to_string(),
            broadcaster_id: "123".to_string(),
            channel_url: String::new(),
            target_guild_id: 1,
            enabled: true,
            max_days_ahead_override: 0,
        }
    }

    #[tokio::test]
    async fn test_dry_run_only_counts() {
        let segments = (1..=8).map(|d| segment(&format!("s{}", d), d)).collect();
        let schedule = Arc::new(FakeSchedule::default().with_segments("123", segments));
        let worker = ScheduleDryRunWorker::new(
            &ScheduleSyncSettings::default(),
            vec![channel()],
            schedule.clone(),
        )
        .with_clock(Arc::new(FixedClock::at(now())));

        let report = worker.run_cycle(&CancellationToken::new()).await;

        assert_eq!(schedule.calls(), 1);
        assert_eq!(report.in_window(), 8);
        assert_eq!(report.created(), 0);
        assert_eq!(report.already_linked(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_respects_window() {
        let schedule = Arc::new(
            FakeSchedule::default().with_segments("123", vec![segment("a", 1), segment("b", 40)]),
        );
        let worker = ScheduleDryRunWorker::new(
            &ScheduleSyncSettings::default(),
            vec![channel()],
            schedule,
        )
        .with_clock(Arc::new(FixedClock::at(now())));

        let report = worker.run_cycle(&CancellationToken::new()).await;

        let ch = report.channel("mortys").unwrap();
        assert_eq!(ch.fetched, 2);
        assert_eq!(ch.in_window, 1);
    }

    #[tokio::test]
    async fn test_dry_run_fetch_failure_reported() {
        let schedule = Arc::new(FakeSchedule::default().failing("123", 500));
        let worker = ScheduleDryRunWorker::new(
            &ScheduleSyncSettings::default(),
            vec![channel()],
            schedule,
        );

        let report = worker.run_cycle(&CancellationToken::new()).await;

        assert_eq!(
            report.channel("mortys").unwrap().status,
            ChannelStatus::FetchFailed
        );
    }

    #[tokio::test]
    async fn test_dry_run_cycle_skipped_when_sync_disabled() {
        let settings = ScheduleSyncSettings {
            enabled: false,
            ..ScheduleSyncSettings::default()
        };
        let schedule =
            Arc::new(FakeSchedule::default().with_segments("123", vec![segment("a", 1)]));
        let worker = ScheduleDryRunWorker::new(&settings, vec![channel()], schedule.clone());

        let report = worker.run_cycle(&CancellationToken::new()).await;

        assert_eq!(schedule.calls(), 0);
        assert_eq!(report.in_window(), 0);
        assert_eq!(
            report.channel("mortys").unwrap().status,
            ChannelStatus::Disabled
        );
    }
}
