//! Service settings.
//!
//! Settings are layered: an optional `settings.{toml,yaml,json}` file, an
//! optional `settings.<APP_ENV>.*` overlay, then `SCHEDSYNC__*` environment
//! variables (`__` separates sections, e.g. `SCHEDSYNC__TWITCH__CLIENT_ID`).
//! `DATABASE_URL` overrides `database.url`.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Deployment environment name, shown by the `about` command
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub schedule_sync: ScheduleSyncSettings,

    #[serde(default)]
    pub twitch: TwitchSettings,

    #[serde(default)]
    pub discord: DiscordSettings,

    #[serde(default)]
    pub ops_security: OpsSecuritySettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub health: HealthSettings,

    /// Timeout for every outbound HTTP request (seconds)
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ScheduleSyncSettings {
    /// Global switch for both the sync loop and the dry-run observer
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minutes between two cycles
    #[serde(default = "default_interval_minutes")]
    #[validate(range(min = 1, max = 1440))]
    pub interval_minutes: u32,

    /// How far ahead segments are synced, unless a channel overrides it
    #[serde(default = "default_max_days_ahead")]
    #[validate(range(min = 1, max = 30))]
    pub max_days_ahead: u32,

    /// Also run the read-only observer next to the sync loop
    #[serde(default)]
    pub dry_run_observer: bool,
}

impl Default for ScheduleSyncSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: default_interval_minutes(),
            max_days_ahead: default_max_days_ahead(),
            dry_run_observer: false,
        }
    }
}

impl ScheduleSyncSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitchSettings {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default = "default_helix_base_url")]
    pub helix_base_url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default)]
    pub channels: Vec<ChannelSettings>,
}

impl Default for TwitchSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            helix_base_url: default_helix_base_url(),
            token_url: default_token_url(),
            channels: Vec::new(),
        }
    }
}

/// One Twitch channel whose schedule is mirrored into a Discord guild.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChannelSettings {
    /// Friendly name, used in logs and event descriptions
    #[serde(default)]
    pub name: String,

    /// Twitch broadcaster_id passed to /helix/schedule
    #[serde(default)]
    pub broadcaster_id: String,

    /// Location of the Discord external event
    #[serde(default)]
    pub channel_url: String,

    /// Discord guild that receives the events
    #[serde(default)]
    pub target_guild_id: u64,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 0 = use `schedule_sync.max_days_ahead`
    #[serde(default)]
    #[validate(range(max = 30))]
    pub max_days_ahead_override: u32,
}

impl ChannelSettings {
    /// Days ahead for this channel; the override wins when set.
    pub fn max_days_ahead(&self, default_days: u32) -> u32 {
        if self.max_days_ahead_override > 0 {
            self.max_days_ahead_override
        } else {
            default_days
        }
    }

    pub fn has_broadcaster(&self) -> bool {
        !self.broadcaster_id.trim().is_empty()
    }

    /// Event location: the configured channel URL or the Twitch front page.
    pub fn location_url(&self) -> &str {
        if self.channel_url.trim().is_empty() {
            DEFAULT_LOCATION_URL
        } else {
            &self.channel_url
        }
    }
}

pub const DEFAULT_LOCATION_URL: &str = "https://twitch.tv";

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordSettings {
    /// Bot token
    #[serde(default)]
    pub token: String,

    #[serde(default = "default_discord_api_base_url")]
    pub api_base_url: String,
}

impl Default for DiscordSettings {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base_url: default_discord_api_base_url(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpsSecuritySettings {
    /// Discord user that may always run ops commands
    #[serde(default)]
    pub bot_owner_id: Option<u64>,

    /// Let guild administrators run ops commands
    #[serde(default)]
    pub allow_guild_admins: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub url: String,

    /// Connect through rustls (managed Postgres providers usually require it)
    #[serde(default)]
    pub tls: bool,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            tls: false,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthSettings {
    /// File written with a UTC timestamp once startup completes
    #[serde(default = "default_ready_file")]
    pub ready_file: PathBuf,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            ready_file: default_ready_file(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_interval_minutes() -> u32 {
    30
}

fn default_max_days_ahead() -> u32 {
    14
}

fn default_http_timeout() -> u64 {
    20
}

fn default_helix_base_url() -> String {
    "https://api.twitch.tv/helix".to_string()
}

fn default_token_url() -> String {
    "https://id.twitch.tv/oauth2/token".to_string()
}

fn default_discord_api_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_max_connections() -> usize {
    4
}

fn default_ready_file() -> PathBuf {
    PathBuf::from("health/ready.txt")
}

impl Settings {
    /// Load settings from files and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let app_env = std::env::var("APP_ENV").ok();

        let mut builder = Config::builder()
            .add_source(File::with_name("settings").required(false));

        if let Some(app_env) = &app_env {
            builder = builder
                .add_source(File::with_name(&format!("settings.{}", app_env)).required(false));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("SCHEDSYNC")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("environment", app_env)?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .build()?;

        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        Ok(config.try_deserialize::<Settings>()?)
    }

    /// Checks needed by anything that reads the Twitch schedule.
    pub fn validate_schedule(&self) -> Result<(), ConfigError> {
        self.schedule_sync.validate()?;

        if self.twitch.client_id.trim().is_empty() {
            return Err(ConfigError::missing("twitch.client_id"));
        }
        if self.twitch.client_secret.trim().is_empty() {
            return Err(ConfigError::missing("twitch.client_secret"));
        }
        if self.twitch.channels.is_empty() {
            return Err(ConfigError::Missing(
                "twitch.channels must list at least one channel".to_string(),
            ));
        }

        for channel in &self.twitch.channels {
            channel.validate().map_err(|e| {
                ConfigError::Missing(format!("channel '{}': {}", channel.name, e))
            })?;
        }

        Ok(())
    }

    /// Checks needed by the full sync loop.
    pub fn validate_sync(&self) -> Result<(), ConfigError> {
        self.validate_schedule()?;
        self.require_database()?;

        if self.discord.token.trim().is_empty() {
            return Err(ConfigError::missing("discord.token"));
        }

        if let Some(channel) = self
            .twitch
            .channels
            .iter()
            .find(|c| c.enabled && c.has_broadcaster() && c.target_guild_id == 0)
        {
            return Err(ConfigError::Missing(format!(
                "channel '{}': target_guild_id must be set",
                channel.name
            )));
        }

        Ok(())
    }

    pub fn require_database(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::missing("DATABASE_URL"));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
