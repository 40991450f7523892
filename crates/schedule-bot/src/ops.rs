//! Operator commands and who may run them.
//!
//! `ping` is open to everyone. `about` and `health` go through
//! [`OpsAccessPolicy`] first.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::bot_info::BotInfo;
use crate::config::OpsSecuritySettings;

/// Who is invoking a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandCaller {
    pub user_id: u64,
    /// `None` for direct messages
    pub guild_id: Option<u64>,
    pub is_guild_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenied {
    #[error("ops commands are not available in direct messages")]
    DirectMessage,

    #[error("you are not allowed to run ops commands")]
    NotAuthorized,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpsAccessPolicy {
    pub bot_owner_id: Option<u64>,
    pub allow_guild_admins: bool,
}

impl From<&OpsSecuritySettings> for OpsAccessPolicy {
    fn from(settings: &OpsSecuritySettings) -> Self {
        Self {
            bot_owner_id: settings.bot_owner_id,
            allow_guild_admins: settings.allow_guild_admins,
        }
    }
}

impl OpsAccessPolicy {
    pub fn check(&self, caller: &CommandCaller) -> Result<(), AccessDenied> {
        if let Some(owner) = self.bot_owner_id.filter(|id| *id != 0) {
            if caller.user_id == owner {
                return Ok(());
            }
        }

        if caller.guild_id.is_none() {
            return Err(AccessDenied::DirectMessage);
        }

        if self.allow_guild_admins && caller.is_guild_admin {
            return Ok(());
        }

        Err(AccessDenied::NotAuthorized)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpsCommand {
    Ping,
    About,
    Health,
}

impl OpsCommand {
    pub fn requires_ops_access(self) -> bool {
        !matches!(self, OpsCommand::Ping)
    }
}

impl FromStr for OpsCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ping" => Ok(OpsCommand::Ping),
            "about" => Ok(OpsCommand::About),
            "health" => Ok(OpsCommand::Health),
            other => Err(format!("unknown command '{}'", other)),
        }
    }
}

impl fmt::Display for OpsCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpsCommand::Ping => "ping",
            OpsCommand::About => "about",
            OpsCommand::Health => "health",
        };
        f.write_str(name)
    }
}

/// Run `command` for `caller` and return the reply text.
pub fn dispatch(
    command: OpsCommand,
    caller: &CommandCaller,
    policy: &OpsAccessPolicy,
    info: &BotInfo,
    now: DateTime<Utc>,
) -> Result<String, AccessDenied> {
    if command.requires_ops_access() {
        if let Err(denied) = policy.check(caller) {
            tracing::warn!(
                user_id = caller.user_id,
                guild_id = ?caller.guild_id,
                "Denied ops command {}: {}",
                command,
                denied
            );
            return Err(denied);
        }
    }

    let reply = match command {
        OpsCommand::Ping => "pong".to_string(),
        OpsCommand::Health => "OK".to_string(),
        OpsCommand::About => format!(
            "{name} | version {version} | environment {env} | uptime {uptime} | {runtime} | machine {machine}",
            name = info.name,
            version = info.version,
            env = info.environment,
            uptime = info.uptime(now),
            runtime = info.runtime,
            machine = info.machine,
        ),
    };

    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const OWNER: u64 = 42;

    fn caller(user_id: u64, guild_id: Option<u64>, is_guild_admin: bool) -> CommandCaller {
        CommandCaller {
            user_id,
            guild_id,
            is_guild_admin,
        }
    }

    fn policy(owner: Option<u64>, admins: bool) -> OpsAccessPolicy {
        OpsAccessPolicy {
            bot_owner_id: owner,
            allow_guild_admins: admins,
        }
    }

    #[test]
    fn test_owner_always_allowed() {
        let p = policy(Some(OWNER), false);

        assert!(p.check(&caller(OWNER, None, false)).is_ok());
        assert!(p.check(&caller(OWNER, Some(1), false)).is_ok());
    }

    #[test]
    fn test_direct_message_denied_for_others() {
        let p = policy(Some(OWNER), true);

        assert_eq!(
            p.check(&caller(7, None, true)),
            Err(AccessDenied::DirectMessage)
        );
    }

    #[test]
    fn test_guild_admin_needs_opt_in() {
        let admin = caller(7, Some(1), true);

        assert!(policy(None, true).check(&admin).is_ok());
        assert_eq!(
            policy(None, false).check(&admin),
            Err(AccessDenied::NotAuthorized)
        );
    }

    #[test]
    fn test_regular_member_denied() {
        assert_eq!(
            policy(Some(OWNER), true).check(&caller(7, Some(1), false)),
            Err(AccessDenied::NotAuthorized)
        );
    }

    #[test]
    fn test_zero_owner_id_matches_nobody() {
        let p = policy(Some(0), false);

        assert_eq!(
            p.check(&caller(0, Some(1), false)),
            Err(AccessDenied::NotAuthorized)
        );
    }

    #[test]
    fn test_dispatch_gates_ops_commands_only() {
        let started = Utc.with_ymd_and_hms(2026, 1, 7, 12, 0, 0).unwrap();
        let info = BotInfo::capture("production", started);
        let now = started + chrono::Duration::seconds(3725);
        let stranger = caller(7, None, false);
        let p = policy(Some(OWNER), false);

        assert_eq!(
            dispatch(OpsCommand::Ping, &stranger, &p, &info, now).unwrap(),
            "pong"
        );
        assert!(dispatch(OpsCommand::Health, &stranger, &p, &info, now).is_err());
        assert!(dispatch(OpsCommand::About, &stranger, &p, &info, now).is_err());

        let owner = caller(OWNER, None, false);
        assert_eq!(
            dispatch(OpsCommand::Health, &owner, &p, &info, now).unwrap(),
            "OK"
        );
        let about = dispatch(OpsCommand::About, &owner, &p, &info, now).unwrap();
        assert!(about.contains("uptime 1h 2m 5s"));
        assert!(about.contains("environment production"));
    }

    #[test]
    fn test_command_names_parse() {
        assert_eq!("PING".parse::<OpsCommand>(), Ok(OpsCommand::Ping));
        assert_eq!("about".parse::<OpsCommand>(), Ok(OpsCommand::About));
        assert!("shutdown".parse::<OpsCommand>().is_err());
        assert_eq!(OpsCommand::Health.to_string(), "health");
    }
}
