//! Linebell configuration system.
//!
//! Values are layered: built-in defaults, then `~/.linebell/config.toml`
//! (or an explicit `--config` file), then environment variables. Required
//! values are checked when a [`DispatchRequest`] is resolved, so a missing
//! key is reported by its environment name before any lock or network work.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LinebellError, Result};
use crate::types::DispatchRequest;

/// Channel access token of the LINE Messaging API channel.
pub const ENV_ACCESS_TOKEN: &str = "LINE_CHANNEL_ACCESS_TOKEN";
/// Recipient (userId / groupId / roomId) for scheduled runs.
pub const ENV_TO: &str = "LINE_TO";
/// Recipient for manual test sends.
pub const ENV_USER_ID: &str = "LINE_USER_ID";
/// Optional message text override.
pub const ENV_MESSAGE: &str = "LINE_MESSAGE";

/// LINE Messaging API push endpoint.
pub const LINE_PUSH_ENDPOINT: &str = "https://api.line.me/v2/bot/message/push";

/// How a command resolves its request: which key names the recipient
/// and what to fall back on when optional values are absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    pub recipient_key: &'static str,
    pub default_message: &'static str,
    pub default_timeout_secs: u64,
}

/// Scheduled run: lock-guarded, 20s timeout.
pub const SCHEDULED: Profile = Profile {
    recipient_key: ENV_TO,
    default_message: "定期通知です！",
    default_timeout_secs: 20,
};

/// Manual connectivity check from a workstation.
pub const MANUAL_TEST: Profile = Profile {
    recipient_key: ENV_USER_ID,
    default_message: "テスト送信：自分のPCから送れた！",
    default_timeout_secs: 10,
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinebellConfig {
    #[serde(default)]
    pub line: LineConfig,
    #[serde(default)]
    pub lock: LockConfig,
}

impl LinebellConfig {
    /// Load config from an explicit path, or from the default path if it exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LinebellError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| LinebellError::Config(format!("Failed to parse config: {e}")))?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Linebell home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".linebell")
    }

    /// Build the request for one run.
    ///
    /// Precedence per value: `message_override` (CLI), then `env`, then the
    /// config file, then the profile default. Required values that are unset
    /// or empty fail with [`LinebellError::ConfigMissing`] naming the env key.
    pub fn resolve_request<F>(
        &self,
        profile: &Profile,
        env: F,
        message_override: Option<&str>,
    ) -> Result<DispatchRequest>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credential = required(&env, ENV_ACCESS_TOKEN, &self.line.channel_access_token)?;
        let recipient = required(&env, profile.recipient_key, &self.line.to)?;

        // A set override is used as-is, even when empty.
        let message = message_override
            .map(str::to_string)
            .or_else(|| env(ENV_MESSAGE))
            .or_else(|| self.line.message.clone())
            .unwrap_or_else(|| profile.default_message.to_string());

        Ok(DispatchRequest::new(recipient, message, credential))
    }

    /// Request timeout for the given profile.
    pub fn timeout(&self, profile: &Profile) -> Result<Duration> {
        let secs = self
            .line
            .timeout_secs
            .unwrap_or(profile.default_timeout_secs);
        if secs == 0 {
            return Err(LinebellError::Config(
                "line.timeout_secs must be positive".into(),
            ));
        }
        Ok(Duration::from_secs(secs))
    }
}

/// Read a process environment variable.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn required<F>(env: &F, key: &str, file_value: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    env(key)
        .filter(|v| !v.is_empty())
        .or_else(|| (!file_value.is_empty()).then(|| file_value.to_string()))
        .ok_or_else(|| LinebellError::ConfigMissing(key.to_string()))
}

/// LINE Messaging API configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct LineConfig {
    #[serde(default)]
    pub channel_access_token: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Falls back to the command's default when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_endpoint() -> String { LINE_PUSH_ENDPOINT.into() }

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_access_token: String::new(),
            to: String::new(),
            message: None,
            endpoint: default_endpoint(),
            timeout_secs: None,
        }
    }
}

impl fmt::Debug for LineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.channel_access_token.is_empty() { "" } else { "***" };
        f.debug_struct("LineConfig")
            .field("channel_access_token", &token)
            .field("to", &self.to)
            .field("message", &self.message)
            .field("endpoint", &self.endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Run lock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_path")]
    pub path: String,
    #[serde(default = "default_lock_ttl")]
    pub ttl_secs: u64,
}

fn default_lock_path() -> String { ".run.lock".into() }
fn default_lock_ttl() -> u64 { 60 * 30 }

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            path: default_lock_path(),
            ttl_secs: default_lock_ttl(),
        }
    }
}

impl LockConfig {
    /// Lock path with `~` expanded.
    pub fn expanded_path(&self) -> Result<PathBuf> {
        if self.path.trim().is_empty() {
            return Err(LinebellError::Config("lock.path must not be empty".into()));
        }
        Ok(PathBuf::from(shellexpand::tilde(&self.path).into_owned()))
    }

    pub fn ttl(&self) -> Result<Duration> {
        if self.ttl_secs == 0 {
            return Err(LinebellError::Config("lock.ttl_secs must be positive".into()));
        }
        Ok(Duration::from_secs(self.ttl_secs))
    }
}
