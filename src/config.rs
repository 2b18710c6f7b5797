//! Configuration management

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::cache::DEFAULT_TTL_SECS;

/// Bot configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token
    pub discord_token: String,

    /// SQLite database path for forms, aliases, and message linkage
    pub db_path: PathBuf,

    /// Alias cache TTL in seconds
    pub cache_ttl_secs: u64,

    /// Prefix for management commands
    pub command_prefix: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let discord_token =
            std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?;

        let db_path = std::env::var("FORMBOT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("formbot")
                    .join("formbot.db")
            });

        let cache_ttl_secs = std::env::var("FORMBOT_CACHE_TTL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TTL_SECS);

        let command_prefix =
            std::env::var("FORMBOT_COMMAND_PREFIX").unwrap_or_else(|_| "fp!".to_string());

        Ok(Self {
            discord_token,
            db_path,
            cache_ttl_secs,
            command_prefix,
        })
    }
}

// Platform-specific dirs fallback
mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .map(PathBuf::from)
                .ok()
                .or_else(|| {
                    std::env::var("HOME")
                        .map(|h| PathBuf::from(h).join(".local/share"))
                        .ok()
                })
        }

        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
                .ok()
        }

        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").map(PathBuf::from).ok()
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            None
        }
    }
}
