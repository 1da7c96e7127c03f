use std::{env, fs, path::Path, path::PathBuf};

use crate::{errors::Error, Result};

/// Typed configuration, loaded from the environment (with optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    /// Bot authentication token. Required.
    pub discord_token: String,

    /// Substring identifying broadcast target channels by name.
    pub channel_search_string: String,

    /// Furthest point in the future a reminder may be scheduled for.
    pub reminder_horizon_days: i64,

    /// Concurrent sends per batch for DM fan-out.
    pub dm_batch_size: usize,

    /// Concurrent sends per batch for channel broadcast fan-out.
    pub broadcast_batch_size: usize,

    /// Command audit log. Disabled when unset.
    pub audit_log_path: Option<PathBuf>,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let discord_token = env_str("DISCORD_TOKEN").unwrap_or_default();
        if discord_token.trim().is_empty() {
            return Err(Error::Config(
                "DISCORD_TOKEN environment variable is required".to_string(),
            ));
        }

        let channel_search_string =
            env_str("CHANNEL_SEARCH_STRING").unwrap_or_else(|| "-group-chat".to_string());

        let reminder_horizon_days = env_i64("REMINDER_HORIZON_DAYS").unwrap_or(365);
        if reminder_horizon_days <= 0 {
            return Err(Error::Config(
                "REMINDER_HORIZON_DAYS must be positive".to_string(),
            ));
        }

        let dm_batch_size = env_usize("DM_BATCH_SIZE").unwrap_or(3).max(1);
        let broadcast_batch_size = env_usize("BROADCAST_BATCH_SIZE").unwrap_or(5).max(1);

        let audit_log_path = env_str("AUDIT_LOG_PATH").map(PathBuf::from);
        let audit_log_json = env_bool("AUDIT_LOG_JSON").unwrap_or(false);

        Ok(Self {
            discord_token,
            channel_search_string,
            reminder_horizon_days,
            dm_batch_size,
            broadcast_batch_size,
            audit_log_path,
            audit_log_json,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}
