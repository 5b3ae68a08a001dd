//! Opening, resetting and closing connections, plus transaction control.

use std::sync::{Arc, Weak};

use super::setup::{self, normalize_encoding};
use super::{Connection, ConnectionBuilder, InFlight, QueryOwner, QueryPhase};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::native::{Connector, FlushStatus, QueryResult};
use crate::status::{ConnectionStatus, IsolationLevel};

impl Connection {
    /// Open a connection with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Operational` if the session cannot be established.
    pub fn open(connector: &dyn Connector, dsn: &str, async_mode: bool) -> Result<Arc<Self>> {
        ConnectionBuilder::new(dsn)
            .async_mode(async_mode)
            .open(connector)
    }

    /// Open a connection using `config` for buffer sizes and the default
    /// isolation level.
    ///
    /// # Errors
    ///
    /// Returns `Error::Operational` if the session cannot be established.
    pub fn open_with_config(
        connector: &dyn Connector,
        dsn: &str,
        async_mode: bool,
        config: &SessionConfig,
    ) -> Result<Arc<Self>> {
        ConnectionBuilder::new(dsn)
            .async_mode(async_mode)
            .config(config.clone())
            .open(connector)
    }

    pub(super) fn start_async(&self, connector: &dyn Connector, dsn: &str) -> Result<()> {
        let session = connector.connect_start(dsn).map_err(Error::operational)?;
        self.locked(|state| state.session = Some(session));
        Ok(())
    }

    pub(super) fn connect_blocking(&self, connector: &dyn Connector, dsn: &str) -> Result<()> {
        let isolation = self.setup_isolation();
        self.detached(|state| {
            state.session = Some(connector.connect(dsn).map_err(Error::operational)?);
            let result = setup::run_blocking(state, isolation);
            if let Err(err) = &result {
                tracing::warn!(error = %err, "connection setup failed, closing");
                state.teardown();
            }
            result
        })
    }

    /// Close the connection. Calling it again has no effect.
    pub fn close(&self) {
        let was_open = self.detached(|state| {
            if state.status == ConnectionStatus::Closed {
                return false;
            }
            state.teardown();
            true
        });
        self.queues.lock().clear();
        if was_open {
            tracing::info!(dsn = self.dsn(), "connection closed");
        }
    }

    /// Reset the session and rerun setup, restoring the default isolation level.
    ///
    /// # Errors
    ///
    /// `Error::Interface` if closed, `Error::Programming` on async
    /// connections, `Error::Operational` if the reset or setup fails, in
    /// which case the connection is closed.
    pub fn reset(&self) -> Result<()> {
        let isolation = self.setup_isolation();
        self.detached(|state| {
            state.ensure_open()?;
            self.ensure_sync("reset")?;
            tracing::info!(dsn = self.dsn(), "resetting connection");
            let result = state
                .session_mut()?
                .reset()
                .map_err(Error::operational)
                .and_then(|()| setup::run_blocking(state, isolation));
            if let Err(err) = &result {
                tracing::warn!(error = %err, "connection reset failed, closing");
                state.teardown();
            }
            result
        })
    }

    /// Commit the open transaction, if any.
    ///
    /// # Errors
    ///
    /// `Error::Programming` on async connections, or the server's error.
    pub fn commit(&self) -> Result<()> {
        self.detached(|state| {
            state.ensure_open()?;
            self.ensure_sync("commit")?;
            state.end_transaction("COMMIT")
        })
    }

    /// Roll back the open transaction, if any.
    ///
    /// # Errors
    ///
    /// `Error::Programming` on async connections, or the server's error.
    pub fn rollback(&self) -> Result<()> {
        self.detached(|state| {
            state.ensure_open()?;
            self.ensure_sync("rollback")?;
            state.end_transaction("ROLLBACK")
        })
    }

    /// Switch isolation level (0 autocommit, 1 read committed, 2 serializable).
    ///
    /// An open transaction is rolled back when leaving a transactional level.
    ///
    /// # Errors
    ///
    /// `Error::Value` for a level outside `0..=2`, `Error::Programming` on
    /// async connections.
    pub fn set_isolation_level(&self, level: i32) -> Result<()> {
        self.detached(|state| {
            state.ensure_open()?;
            self.ensure_sync("set_isolation_level")?;
            let level = IsolationLevel::from_level(level)?;
            if state.isolation_level == level {
                return Ok(());
            }
            if state.isolation_level != IsolationLevel::Autocommit {
                state.end_transaction("ROLLBACK")?;
            }
            tracing::debug!(from = ?state.isolation_level, to = ?level, "isolation level");
            state.isolation_level = level;
            Ok(())
        })
    }

    /// Change the client encoding.
    ///
    /// The name is normalized first; setting the current encoding again
    /// does nothing. An open transaction is rolled back.
    ///
    /// # Errors
    ///
    /// `Error::Programming` on async connections, or the server's error.
    pub fn set_client_encoding(&self, encoding: &str) -> Result<()> {
        self.detached(|state| {
            state.ensure_open()?;
            self.ensure_sync("set_client_encoding")?;
            let encoding = normalize_encoding(encoding);
            let current = state.info.as_ref().map(|i| i.encoding.as_str());
            if current == Some(encoding.as_str()) {
                return Ok(());
            }
            state.end_transaction("ROLLBACK")?;
            let escaped = encoding.replace('\'', "''");
            state.execute_command(&format!("SET client_encoding = '{escaped}'"))?;
            if let Some(info) = state.info.as_mut() {
                info.encoding = encoding;
            }
            Ok(())
        })
    }

    /// Run `sql` to completion and return its last result.
    ///
    /// A transaction block is opened first unless the connection is in
    /// autocommit mode.
    ///
    /// # Errors
    ///
    /// `Error::Programming` on async connections, or the server's error
    /// classified by SQLSTATE.
    pub fn execute(&self, sql: &str) -> Result<QueryResult> {
        self.detached(|state| {
            state.ensure_open()?;
            self.ensure_sync("execute")?;
            state.begin_if_needed()?;
            state.execute_command(sql)
        })
    }

    /// Submit `sql` on an async connection.
    ///
    /// The query is driven by [`poll`](Self::poll); `owner` receives the
    /// results once the server is done. Only one query may be in flight.
    ///
    /// # Errors
    ///
    /// `Error::Programming` on blocking connections or while another query
    /// is in flight, `Error::Operational` while the connection attempt is
    /// still underway or if the query cannot be sent.
    pub fn send_query(&self, sql: &str, owner: Weak<dyn QueryOwner>) -> Result<()> {
        self.locked(|state| {
            state.ensure_open()?;
            if !self.async_mode {
                return Err(Error::programming(
                    "send_query requires an asynchronous connection",
                ));
            }
            if !state.status.is_usable() {
                return Err(Error::operational("asynchronous connection attempt underway"));
            }
            if state.in_flight.is_some() {
                return Err(Error::programming("another asynchronous query is in progress"));
            }
            let session = state.session_mut()?;
            tracing::trace!(sql, "sending async query");
            session.send_query(sql).map_err(Error::operational)?;
            let phase = match session.flush().map_err(Error::operational)? {
                FlushStatus::Done => QueryPhase::Reading,
                FlushStatus::Pending => QueryPhase::Flushing,
            };
            state.in_flight = Some(InFlight { owner, phase });
            Ok(())
        })
    }
}
