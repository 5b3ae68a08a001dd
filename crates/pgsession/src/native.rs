//! Narrow interface to the native session handle.
//!
//! The transport and wire protocol live behind [`NativeSession`]; this crate
//! only drives it. Method semantics follow the usual client-library
//! primitives: a resumable handshake poll, a non-blocking
//! send/flush/consume/fetch cycle, and blocking command execution.

use std::fmt;

use crate::status::TransactionStatus;

/// Outcome of one step of the native handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePoll {
    /// Wait for the socket to become readable.
    Reading,
    /// Wait for the socket to become writable.
    Writing,
    /// Handshake failed; the reason is in [`NativeSession::error_message`].
    Failed,
    /// Session established.
    Ok,
    /// Raw code outside the values above.
    Unknown(i32),
}

/// Outcome of flushing queued output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Everything has been written.
    Done,
    /// Output remains queued; wait for writability and flush again.
    Pending,
}

/// Status of a single server result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    EmptyQuery,
    CommandOk,
    TuplesOk,
    NonfatalError,
    FatalError,
}

/// Error reported by the server for a failed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub message: String,
    pub sqlstate: Option<String>,
}

/// One server result in text format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub status: ResultStatus,
    pub rows: Vec<Vec<Option<String>>>,
    pub error: Option<ServerError>,
}

impl QueryResult {
    /// Successful command without rows.
    #[must_use]
    pub const fn command_ok() -> Self {
        Self {
            status: ResultStatus::CommandOk,
            rows: Vec::new(),
            error: None,
        }
    }

    /// Successful query returning `rows`.
    #[must_use]
    pub const fn tuples(rows: Vec<Vec<Option<String>>>) -> Self {
        Self {
            status: ResultStatus::TuplesOk,
            rows,
            error: None,
        }
    }

    /// Failed command.
    #[must_use]
    pub fn fatal(message: impl Into<String>, sqlstate: Option<&str>) -> Self {
        Self {
            status: ResultStatus::FatalError,
            rows: Vec::new(),
            error: Some(ServerError {
                message: message.into(),
                sqlstate: sqlstate.map(str::to_owned),
            }),
        }
    }

    /// Value at `(row, column)`, `None` for SQL NULL or out of range.
    #[must_use]
    pub fn value(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column)?.as_deref()
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.status, ResultStatus::FatalError)
    }
}

/// Asynchronous notification delivered by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Process id of the notifying backend.
    pub pid: i32,
    pub channel: String,
    pub payload: String,
}

/// Live transport and protocol session.
///
/// Owned exclusively by a [`Connection`](crate::Connection) and only ever
/// touched while its guard is held. Notices raised while any method runs
/// must be buffered by the implementation and handed over through
/// [`take_notices`](Self::take_notices), never delivered re-entrantly.
pub trait NativeSession: Send + fmt::Debug {
    /// Advance the handshake by one non-blocking step.
    fn connect_poll(&mut self) -> HandshakePoll;

    /// Text of the most recent failure, verbatim.
    fn error_message(&self) -> String;

    /// Server parameter reported during startup or via parameter status messages.
    fn parameter_status(&self, name: &str) -> Option<String>;

    fn protocol_version(&self) -> i32;

    fn server_version(&self) -> i32;

    fn backend_pid(&self) -> i32;

    /// OS-level descriptor of the transport.
    fn socket(&self) -> i32;

    fn transaction_status(&self) -> TransactionStatus;

    /// Queue a single statement without waiting for the server.
    fn send_query(&mut self, sql: &str) -> Result<(), String>;

    /// Write queued output without blocking.
    fn flush(&mut self) -> Result<FlushStatus, String>;

    /// Read whatever input is available without blocking.
    fn consume_input(&mut self) -> Result<(), String>;

    /// True while a result cannot be fetched without blocking.
    fn is_busy(&self) -> bool;

    /// Next pending result, `None` once the command is complete.
    fn get_result(&mut self) -> Option<QueryResult>;

    /// Run a command to completion and return its last result.
    ///
    /// May block. `Err` means the transport failed; a command rejected by
    /// the server comes back as a [`ResultStatus::FatalError`] result.
    fn exec(&mut self, sql: &str) -> Result<QueryResult, String>;

    /// Close and reopen the session with the same parameters. May block.
    fn reset(&mut self) -> Result<(), String>;

    /// Terminate the session. Called at most once.
    fn finish(&mut self);

    /// Notices collected since the last call, oldest first.
    fn take_notices(&mut self) -> Vec<String>;

    /// Notifications collected since the last call, oldest first.
    fn take_notifications(&mut self) -> Vec<Notification>;
}

/// Factory for native sessions.
pub trait Connector {
    /// Establish a session, blocking until the handshake completes.
    fn connect(&self, dsn: &str) -> Result<Box<dyn NativeSession>, String>;

    /// Start a non-blocking handshake, to be completed through
    /// [`NativeSession::connect_poll`].
    fn connect_start(&self, dsn: &str) -> Result<Box<dyn NativeSession>, String>;
}
