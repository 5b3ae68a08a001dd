//! TOML configuration file loading

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::builder::SessionConfigBuilder;
use crate::status::IsolationLevel;
use crate::{Error, Result};

/// Configuration file locations checked in order
const CONFIG_PATHS: &[&str] = &[
    "./pgsession.toml",
    "~/.config/pgsession/config.toml",
    "/etc/pgsession/config.toml",
];

/// Find the first existing configuration file
pub fn find_config_file() -> Option<PathBuf> {
    for path_str in CONFIG_PATHS {
        let path = if path_str.starts_with('~') {
            if let Ok(home) = std::env::var("HOME") {
                PathBuf::from(path_str.replacen('~', &home, 1))
            } else {
                continue;
            }
        } else {
            PathBuf::from(path_str)
        };

        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Load configuration from a TOML file
pub fn load_from_file(path: &Path, builder: SessionConfigBuilder) -> Result<SessionConfigBuilder> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::interface(format!(
            "Failed to read config file {}: {e}",
            path.display()
        ))
    })?;

    let file_config: FileConfig = toml::from_str(&content).map_err(|e| {
        Error::value(format!(
            "Failed to parse config file {}: {e}",
            path.display()
        ))
    })?;

    apply_file_config(builder, file_config)
}

fn apply_file_config(
    mut builder: SessionConfigBuilder,
    config: FileConfig,
) -> Result<SessionConfigBuilder> {
    if let Some(session) = config.session {
        if let Some(capacity) = session.notice_capacity {
            builder = builder.notice_capacity(non_zero("session.notice_capacity", capacity)?);
        }

        if let Some(capacity) = session.notify_capacity {
            builder = builder.notify_capacity(non_zero("session.notify_capacity", capacity)?);
        }

        if let Some(level) = session.isolation_level {
            let level = IsolationLevel::from_level(level).map_err(|e| {
                Error::value(format!("Invalid session.isolation_level: {}", e.message()))
            })?;
            builder = builder.default_isolation_level(level);
        }
    }

    if let Some(logging) = config.logging {
        if let Some(level) = logging.log_level {
            builder = builder.log_level(level);
        }

        if let Some(json) = logging.json_logs {
            builder = builder.json_logs(json);
        }
    }

    Ok(builder)
}

fn non_zero(name: &str, value: usize) -> Result<NonZeroUsize> {
    NonZeroUsize::new(value).ok_or_else(|| Error::value(format!("Invalid {name}: must be > 0")))
}

/// Root configuration file structure
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    session: Option<SessionSection>,
    logging: Option<LoggingSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionSection {
    notice_capacity: Option<usize>,
    notify_capacity: Option<usize>,
    isolation_level: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingSection {
    log_level: Option<String>,
    json_logs: Option<bool>,
}
