//! Environment variable loading for configuration

use std::env;
use std::num::NonZeroUsize;

use super::builder::SessionConfigBuilder;
use crate::status::IsolationLevel;
use crate::{Error, Result};

/// Environment variable names
mod vars {
    pub const NOTICE_CAPACITY: &str = "PGSESSION_NOTICE_CAPACITY";
    pub const NOTIFY_CAPACITY: &str = "PGSESSION_NOTIFY_CAPACITY";
    pub const ISOLATION_LEVEL: &str = "PGSESSION_ISOLATION_LEVEL";
    pub const LOG_LEVEL: &str = "PGSESSION_LOG_LEVEL";
    pub const JSON_LOGS: &str = "PGSESSION_JSON_LOGS";
}

/// Load configuration from environment variables
pub fn load_from_env(mut builder: SessionConfigBuilder) -> Result<SessionConfigBuilder> {
    if let Ok(value) = env::var(vars::NOTICE_CAPACITY) {
        builder = builder.notice_capacity(parse_capacity(vars::NOTICE_CAPACITY, &value)?);
    }

    if let Ok(value) = env::var(vars::NOTIFY_CAPACITY) {
        builder = builder.notify_capacity(parse_capacity(vars::NOTIFY_CAPACITY, &value)?);
    }

    if let Ok(value) = env::var(vars::ISOLATION_LEVEL) {
        let level = value
            .trim()
            .parse::<i32>()
            .map_err(|e| Error::value(format!("Invalid {}: {e}", vars::ISOLATION_LEVEL)))
            .and_then(|level| {
                IsolationLevel::from_level(level).map_err(|e| {
                    Error::value(format!("Invalid {}: {}", vars::ISOLATION_LEVEL, e.message()))
                })
            })?;
        builder = builder.default_isolation_level(level);
    }

    if let Ok(level) = env::var(vars::LOG_LEVEL) {
        builder = builder.log_level(level);
    }

    if let Ok(value) = env::var(vars::JSON_LOGS) {
        builder = builder.json_logs(parse_bool(&value));
    }

    Ok(builder)
}

fn parse_capacity(name: &str, value: &str) -> Result<NonZeroUsize> {
    value
        .trim()
        .parse::<NonZeroUsize>()
        .map_err(|e| Error::value(format!("Invalid {name}: {e}")))
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
pub(super) mod tests {
    use std::sync::Mutex;

    use super::*;

    pub(in crate::config) static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn with_env_vars<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = ENV_MUTEX.lock().unwrap();

        let old_values: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        for (key, value) in vars {
            // SAFETY: We hold a mutex lock to ensure no concurrent modifications
            unsafe { env::set_var(key, value) };
        }

        let result = f();

        for (key, old_value) in old_values {
            match old_value {
                // SAFETY: We hold a mutex lock to ensure no concurrent modifications
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("ON"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("nope"));
    }

    #[test]
    fn test_env_overrides() {
        let config = with_env_vars(
            &[
                (vars::NOTICE_CAPACITY, "5"),
                (vars::ISOLATION_LEVEL, "2"),
                (vars::LOG_LEVEL, "debug"),
                (vars::JSON_LOGS, "yes"),
            ],
            || load_from_env(SessionConfigBuilder::new()),
        )
        .unwrap()
        .build();

        assert_eq!(config.notice_capacity.get(), 5);
        assert_eq!(config.default_isolation_level, IsolationLevel::Serializable);
        assert_eq!(config.logging.log_level, "debug");
        assert!(config.logging.json_logs);
    }

    #[test]
    fn test_invalid_capacity_is_value_error() {
        let err = with_env_vars(&[(vars::NOTIFY_CAPACITY, "0")], || {
            load_from_env(SessionConfigBuilder::new())
        })
        .unwrap_err();
        assert!(err.is_value());
        assert!(err.message().contains(vars::NOTIFY_CAPACITY));
    }

    #[test]
    fn test_isolation_level_out_of_range() {
        let err = with_env_vars(&[(vars::ISOLATION_LEVEL, "7")], || {
            load_from_env(SessionConfigBuilder::new())
        })
        .unwrap_err();
        assert!(err.is_value());
        assert!(err.message().contains("out of bounds"));
    }
}
