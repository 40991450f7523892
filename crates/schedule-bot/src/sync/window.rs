use chrono::{DateTime, Duration, Utc};
use shared_types::Segment;

/// The `[now, now + days]` range a cycle syncs, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub days: u32,
}

impl SyncWindow {
    pub fn starting_at(now: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: now,
            end: now + Duration::days(i64::from(days)),
            days,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }

    /// Segments starting inside the window, ordered by start time.
    pub fn select(&self, segments: Vec<Segment>) -> Vec<Segment> {
        let mut selected: Vec<Segment> = segments
            .into_iter()
            .filter(|s| self.contains(s.start_utc))
            .collect();
        selected.sort_by_key(|s| s.start_utc);
        selected
    }
}
