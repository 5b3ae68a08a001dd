//! Connection builder.

use std::fmt;
use std::sync::Arc;

use super::Connection;
use crate::config::SessionConfig;
use crate::dsn;
use crate::error::Result;
use crate::guard::{Attached, Detach};
use crate::native::Connector;

/// Builder for [`Connection`].
///
/// # Example
///
/// ```rust,ignore
/// use pgsession::ConnectionBuilder;
///
/// let conn = ConnectionBuilder::new("host=db dbname=app password=secret")
///     .async_mode(true)
///     .open(&connector)?;
/// assert_eq!(conn.dsn(), "host=db dbname=app password=xxxxxx");
/// ```
pub struct ConnectionBuilder {
    dsn: String,
    async_mode: bool,
    config: SessionConfig,
    detach: Arc<dyn Detach>,
}

impl fmt::Debug for ConnectionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBuilder")
            .field("dsn", &dsn::redact(&self.dsn))
            .field("async_mode", &self.async_mode)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConnectionBuilder {
    #[must_use]
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            async_mode: false,
            config: SessionConfig::default(),
            detach: Arc::new(Attached),
        }
    }

    /// Open a non-blocking connection driven through `poll()`.
    #[must_use]
    pub const fn async_mode(mut self, async_mode: bool) -> Self {
        self.async_mode = async_mode;
        self
    }

    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Hook wrapped around every native call that may block.
    #[must_use]
    pub fn detach(mut self, detach: Arc<dyn Detach>) -> Self {
        self.detach = detach;
        self
    }

    /// Establish the connection.
    ///
    /// Blocking connections are fully set up on return. Async ones are
    /// returned in `Setup` status and must be driven with `poll()`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Operational` if the connector or the blocking setup
    /// fails.
    pub fn open(self, connector: &dyn Connector) -> Result<Arc<Connection>> {
        let Self {
            dsn,
            async_mode,
            config,
            detach,
        } = self;
        let conn = Arc::new(Connection::new(
            dsn::redact(&dsn),
            async_mode,
            &config,
            detach,
        ));
        tracing::info!(dsn = conn.dsn(), async_mode, "opening connection");
        if async_mode {
            conn.start_async(connector, &dsn)?;
        } else {
            conn.connect_blocking(connector, &dsn)?;
        }
        Ok(conn)
    }
}
