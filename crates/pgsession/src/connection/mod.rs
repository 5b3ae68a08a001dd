//! Connection handle.
//!
//! A [`Connection`] owns one native session and is always shared as
//! `Arc<Connection>`. All mutable state sits behind the per-connection
//! guard; server messages are handed to [`MessageQueues`] only after the
//! guard has been released.

mod builder;
mod lifecycle;
mod poll;
mod setup;

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

pub use builder::ConnectionBuilder;
pub use setup::{DateStyle, normalize_encoding};

use crate::config::SessionConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::guard::{Detach, SessionLock};
use crate::native::{NativeSession, Notification, QueryResult};
use crate::notice::{Drained, MessageQueues, NoticeObserver};
use crate::status::{ConnectionStatus, IsolationLevel, TransactionStatus};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Receives the outcome of a query submitted with [`Connection::send_query`].
///
/// Called from `poll()` after the guard has been released.
pub trait QueryOwner: Send + Sync {
    fn query_complete(&self, outcome: Result<Vec<QueryResult>>);
}

/// Session parameters learned during setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub datestyle: DateStyle,
    /// Client encoding as reported by the server, upper-cased.
    pub encoding: String,
    pub server_version: i32,
    pub protocol_version: i32,
    pub standard_conforming_strings: bool,
}

#[derive(Debug, Default)]
pub(crate) struct SetupProgress {
    pub(crate) standard_conforming_strings: bool,
    pub(crate) server_version: i32,
    pub(crate) protocol_version: i32,
    pub(crate) datestyle: Option<DateStyle>,
    pub(crate) encoding: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueryPhase {
    /// Statement queued, output not fully written.
    Flushing,
    /// Waiting for the server's results.
    Reading,
}

pub(crate) struct InFlight {
    pub(crate) owner: Weak<dyn QueryOwner>,
    pub(crate) phase: QueryPhase,
}

/// Everything protected by the session guard.
pub(crate) struct SessionState {
    pub(crate) session: Option<Box<dyn NativeSession>>,
    pub(crate) status: ConnectionStatus,
    pub(crate) in_flight: Option<InFlight>,
    pub(crate) progress: SetupProgress,
    pub(crate) info: Option<SessionInfo>,
    pub(crate) isolation_level: IsolationLevel,
    /// Messages rescued from a session that was finished mid-span.
    stash: Drained,
}

impl SessionState {
    fn new(isolation_level: IsolationLevel) -> Self {
        Self {
            session: None,
            status: ConnectionStatus::Setup,
            in_flight: None,
            progress: SetupProgress::default(),
            info: None,
            isolation_level,
            stash: Drained::default(),
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.status == ConnectionStatus::Closed {
            Err(Error::closed())
        } else {
            Ok(())
        }
    }

    pub(crate) fn session_mut(&mut self) -> Result<&mut Box<dyn NativeSession>> {
        self.session.as_mut().ok_or_else(Error::closed)
    }

    pub(crate) fn session_ref(&self) -> Result<&dyn NativeSession> {
        self.session.as_deref().ok_or_else(Error::closed)
    }

    pub(crate) fn advance(&mut self, next: ConnectionStatus) {
        tracing::debug!(from = %self.status, to = %next, "connection status");
        self.status = next;
    }

    /// Finish the native session and mark the connection closed.
    pub(crate) fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            self.stash.extend(Drained {
                notices: session.take_notices(),
                notifications: session.take_notifications(),
            });
            session.finish();
        }
        self.in_flight = None;
        self.advance(ConnectionStatus::Closed);
    }

    fn take_drained(&mut self) -> Drained {
        let mut drained = std::mem::take(&mut self.stash);
        if let Some(session) = self.session.as_mut() {
            drained.extend(Drained {
                notices: session.take_notices(),
                notifications: session.take_notifications(),
            });
        }
        drained
    }

    /// Run a command synchronously, mapping server failures by SQLSTATE.
    pub(crate) fn execute_command(&mut self, sql: &str) -> Result<QueryResult> {
        tracing::trace!(sql, "executing command");
        let result = self.session_mut()?.exec(sql).map_err(Error::operational)?;
        match &result.error {
            Some(err) if result.is_error() => {
                Err(Error::from_sqlstate(err.sqlstate.as_deref(), err.message.clone()))
            }
            _ => Ok(result),
        }
    }

    /// Open a transaction block if the isolation level requires one.
    pub(crate) fn begin_if_needed(&mut self) -> Result<()> {
        if self.status != ConnectionStatus::Ready {
            return Ok(());
        }
        let Some(begin) = self.isolation_level.begin_statement() else {
            return Ok(());
        };
        self.execute_command(begin)?;
        self.advance(ConnectionStatus::Begin);
        Ok(())
    }

    /// Issue `COMMIT` or `ROLLBACK` if a transaction block is open.
    pub(crate) fn end_transaction(&mut self, sql: &str) -> Result<()> {
        if self.isolation_level == IsolationLevel::Autocommit
            || self.status != ConnectionStatus::Begin
        {
            tracing::trace!(sql, "no transaction open, nothing to do");
            return Ok(());
        }
        self.execute_command(sql)?;
        self.advance(ConnectionStatus::Ready);
        Ok(())
    }
}

/// Session with a PostgreSQL server.
///
/// Opened with [`Connection::open`] or a [`ConnectionBuilder`]. In blocking
/// mode every method completes before returning. In async mode the caller
/// drives [`poll`](Connection::poll) from its own event loop, waiting on
/// [`fileno`](Connection::fileno) as instructed, and blocking operations
/// are rejected.
pub struct Connection {
    id: ConnectionId,
    dsn: String,
    async_mode: bool,
    default_isolation: IsolationLevel,
    lock: SessionLock<SessionState>,
    queues: Mutex<MessageQueues>,
}

impl Connection {
    fn new(
        dsn: String,
        async_mode: bool,
        config: &SessionConfig,
        detach: Arc<dyn Detach>,
    ) -> Self {
        let isolation = if async_mode {
            IsolationLevel::Autocommit
        } else {
            config.default_isolation_level
        };
        Self {
            id: ConnectionId::next(),
            dsn,
            async_mode,
            default_isolation: config.default_isolation_level,
            lock: SessionLock::new(SessionState::new(isolation), detach),
            queues: Mutex::new(MessageQueues::new(
                config.notice_capacity,
                config.notify_capacity,
            )),
        }
    }

    /// Run `f` under the guard, then deliver drained messages.
    pub(crate) fn locked<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let (out, drained) = {
            let mut state = self.lock.lock();
            let out = f(&mut *state);
            (out, state.take_drained())
        };
        self.deliver(drained);
        out
    }

    /// Like [`locked`](Self::locked), for spans that may block in the native layer.
    pub(crate) fn detached<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let (out, drained) = self.lock.with_detached(|state| {
            let out = f(&mut *state);
            (out, state.take_drained())
        });
        self.deliver(drained);
        out
    }

    fn deliver(&self, drained: Drained) {
        if drained.is_empty() {
            return;
        }
        let observers = self.queues.lock().absorb(&drained);
        for notice in &drained.notices {
            for observer in &observers {
                observer.on_notice(notice);
            }
        }
    }

    pub(crate) fn ensure_sync(&self, operation: &str) -> Result<()> {
        if self.async_mode {
            Err(Error::async_forbidden(operation))
        } else {
            Ok(())
        }
    }

    /// Isolation level applied when setup completes.
    pub(crate) const fn setup_isolation(&self) -> IsolationLevel {
        if self.async_mode {
            IsolationLevel::Autocommit
        } else {
            self.default_isolation
        }
    }

    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Connection string with the password masked.
    #[must_use]
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    #[must_use]
    pub const fn is_async(&self) -> bool {
        self.async_mode
    }

    #[must_use]
    pub fn closed(&self) -> bool {
        self.status() == ConnectionStatus::Closed
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.lock.lock().status
    }

    #[must_use]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.lock.lock().isolation_level
    }

    /// Parameters learned during setup, `None` until the connection is ready.
    #[must_use]
    pub fn session_info(&self) -> Option<SessionInfo> {
        self.lock.lock().info.clone()
    }

    #[must_use]
    pub fn encoding(&self) -> Option<String> {
        self.lock.lock().info.as_ref().map(|i| i.encoding.clone())
    }

    #[must_use]
    pub fn datestyle(&self) -> Option<DateStyle> {
        self.lock.lock().info.as_ref().map(|i| i.datestyle.clone())
    }

    #[must_use]
    pub fn server_version(&self) -> Option<i32> {
        self.lock.lock().info.as_ref().map(|i| i.server_version)
    }

    #[must_use]
    pub fn protocol_version(&self) -> Option<i32> {
        self.lock.lock().info.as_ref().map(|i| i.protocol_version)
    }

    #[must_use]
    pub fn standard_conforming_strings(&self) -> Option<bool> {
        self.lock
            .lock()
            .info
            .as_ref()
            .map(|i| i.standard_conforming_strings)
    }

    /// The DB-API error kinds raised by this connection.
    #[must_use]
    pub const fn error_kinds(&self) -> &'static [ErrorKind] {
        &ErrorKind::ALL
    }

    /// Buffered notices, oldest first.
    #[must_use]
    pub fn notices(&self) -> Vec<String> {
        self.queues.lock().notices.iter().cloned().collect()
    }

    /// Buffered notifications, oldest first.
    #[must_use]
    pub fn notifies(&self) -> Vec<Notification> {
        self.queues.lock().notifies.iter().cloned().collect()
    }

    /// Remove and return the buffered notifications.
    pub fn take_notifies(&self) -> Vec<Notification> {
        self.queues.lock().notifies.drain()
    }

    /// Register an observer for every notice received from now on.
    pub fn add_notice_observer(&self, observer: Arc<dyn NoticeObserver>) {
        self.queues.lock().add_observer(observer);
    }

    pub fn get_transaction_status(&self) -> Result<TransactionStatus> {
        self.locked(|state| {
            state.ensure_open()?;
            Ok(state.session_ref()?.transaction_status())
        })
    }

    pub fn get_parameter_status(&self, name: &str) -> Result<Option<String>> {
        self.locked(|state| {
            state.ensure_open()?;
            Ok(state.session_ref()?.parameter_status(name))
        })
    }

    pub fn get_backend_pid(&self) -> Result<i32> {
        self.locked(|state| {
            state.ensure_open()?;
            Ok(state.session_ref()?.backend_pid())
        })
    }

    /// Descriptor to register with the event loop.
    pub fn fileno(&self) -> Result<i32> {
        self.locked(|state| {
            state.ensure_open()?;
            Ok(state.session_ref()?.socket())
        })
    }

    /// True if an async connection is still connecting or has a query in flight.
    pub fn isexecuting(&self) -> Result<bool> {
        self.locked(|state| {
            state.ensure_open()?;
            if !self.async_mode {
                return Ok(false);
            }
            Ok(state.status.is_connecting() || state.in_flight.is_some())
        })
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("dsn", &self.dsn)
            .field("async_mode", &self.async_mode)
            .field("lock", &self.lock)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Connection(dsn='{}', closed={})",
            self.dsn,
            self.closed()
        )
    }
}
