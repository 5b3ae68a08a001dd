//! Connection, poll and transaction status values.

use std::fmt;

use crate::error::{Error, Result};

/// Connection status.
///
/// Advances strictly forward through the setup states; once `Ready` it only
/// moves between `Ready` and `Begin`, and `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// Created, handshake not started by `poll()` yet.
    Setup,
    /// Inside the native handshake-poll loop.
    Async,
    SendDatestyle,
    SentDatestyle,
    GetDatestyle,
    SendClientEncoding,
    SentClientEncoding,
    GetClientEncoding,
    /// Usable, no transaction open.
    Ready,
    /// Usable, inside a transaction block.
    Begin,
    Closed,
}

impl ConnectionStatus {
    /// True once setup is complete and queries may be issued.
    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Ready | Self::Begin)
    }

    /// True while the handshake or the setup queries are still running.
    #[must_use]
    pub const fn is_connecting(self) -> bool {
        !matches!(self, Self::Ready | Self::Begin | Self::Closed)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Setup => "setup",
            Self::Async => "async",
            Self::SendDatestyle => "send_datestyle",
            Self::SentDatestyle => "sent_datestyle",
            Self::GetDatestyle => "get_datestyle",
            Self::SendClientEncoding => "send_client_encoding",
            Self::SentClientEncoding => "sent_client_encoding",
            Self::GetClientEncoding => "get_client_encoding",
            Self::Ready => "ready",
            Self::Begin => "begin",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// What the event loop should wait for before calling `poll()` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollStatus {
    /// Operation complete.
    Ok,
    /// Wait until the socket is readable.
    NeedRead,
    /// Wait until the socket is writable.
    NeedWrite,
}

impl PollStatus {
    /// Numeric code: 0 ok, 1 read, 2 write.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::NeedRead => 1,
            Self::NeedWrite => 2,
        }
    }
}

/// Server-reported transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionStatus {
    #[default]
    Idle,
    /// A command is in progress.
    Active,
    /// Idle inside a valid transaction block.
    InTransaction,
    /// Idle inside a failed transaction block.
    InError,
    /// Connection is bad.
    Unknown,
}

impl TransactionStatus {
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Idle => 0,
            Self::Active => 1,
            Self::InTransaction => 2,
            Self::InError => 3,
            Self::Unknown => 4,
        }
    }
}

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IsolationLevel {
    /// Every statement commits on its own.
    Autocommit,
    ReadCommitted,
    Serializable,
}

impl IsolationLevel {
    /// Numeric level as exposed to callers.
    #[must_use]
    pub const fn level(self) -> i32 {
        match self {
            Self::Autocommit => 0,
            Self::ReadCommitted => 1,
            Self::Serializable => 2,
        }
    }

    /// Parse a numeric level, rejecting anything outside `0..=2`.
    pub fn from_level(level: i32) -> Result<Self> {
        match level {
            0 => Ok(Self::Autocommit),
            1 => Ok(Self::ReadCommitted),
            2 => Ok(Self::Serializable),
            _ => Err(Error::value("isolation level out of bounds (0,3)")),
        }
    }

    /// Statement opening a transaction at this level, `None` in autocommit.
    #[must_use]
    pub const fn begin_statement(self) -> Option<&'static str> {
        match self {
            Self::Autocommit => None,
            Self::ReadCommitted => Some("BEGIN; SET TRANSACTION ISOLATION LEVEL READ COMMITTED"),
            Self::Serializable => Some("BEGIN; SET TRANSACTION ISOLATION LEVEL SERIALIZABLE"),
        }
    }
}
