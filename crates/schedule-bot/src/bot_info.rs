use chrono::{DateTime, Utc};

/// Static facts about this process, captured once at startup.
#[derive(Debug, Clone)]
pub struct BotInfo {
    pub name: String,
    pub version: String,
    pub environment: String,
    pub started_at: DateTime<Utc>,
    pub runtime: String,
    pub machine: String,
}

impl BotInfo {
    pub fn capture(environment: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: environment.to_string(),
            started_at,
            runtime: format!("Rust / tokio on {}-{}", std::env::consts::OS, std::env::consts::ARCH),
            machine: machine_name(),
        }
    }

    /// Uptime as `"{h}h {m}m {s}s"`; hours are not wrapped into days.
    pub fn uptime(&self, now: DateTime<Utc>) -> String {
        let secs = (now - self.started_at).num_seconds().max(0);
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

fn machine_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}
