//! Session configuration
//!
//! Supports configuration loading with precedence: env > file > defaults

mod builder;
mod env;
mod file;

pub use builder::{LoggingConfig, SessionConfig, SessionConfigBuilder};
pub use file::find_config_file;

use crate::Result;

/// Load configuration with precedence: env > file > defaults
pub fn load_config() -> Result<SessionConfig> {
    let mut builder = SessionConfigBuilder::new();

    if let Some(path) = file::find_config_file() {
        tracing::info!("Loading configuration from {}", path.display());
        builder = file::load_from_file(&path, builder)?;
    }

    env::load_from_env(builder).map(SessionConfigBuilder::build)
}

/// Load configuration from a specific file path, then apply the environment
pub fn load_config_from_path(path: &std::path::Path) -> Result<SessionConfig> {
    let builder = file::load_from_file(path, SessionConfigBuilder::new())?;
    env::load_from_env(builder).map(SessionConfigBuilder::build)
}
