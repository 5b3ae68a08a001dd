//! Large objects.

use std::str::FromStr;
use std::sync::Arc;

use crate::connection::{Connection, ConnectionId};
use crate::error::{Error, Result};
use crate::factory::{LargeObject, LobjectArgs};
use crate::status::IsolationLevel;

/// PostgreSQL object identifier.
pub type Oid = u32;

const INV_WRITE: i32 = 0x0002_0000;
const INV_READ: i32 = 0x0004_0000;

/// Access mode of a large object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobMode {
    Read,
    Write,
    ReadWrite,
    /// Create or look up the object without opening it.
    NoOpen,
}

impl LobMode {
    /// Flags for `lo_open`, `-1` for [`LobMode::NoOpen`].
    #[must_use]
    pub const fn flags(self) -> i32 {
        match self {
            Self::Read => INV_READ,
            Self::Write => INV_WRITE,
            Self::ReadWrite => INV_READ | INV_WRITE,
            Self::NoOpen => -1,
        }
    }
}

impl FromStr for LobMode {
    type Err = Error;

    /// A leading `"rw"` opens for both; otherwise only the first letter counts.
    fn from_str(s: &str) -> Result<Self> {
        if s.starts_with("rw") {
            return Ok(Self::ReadWrite);
        }
        match s.chars().next() {
            Some('r') => Ok(Self::Read),
            Some('w') => Ok(Self::Write),
            Some('n') => Ok(Self::NoOpen),
            _ => Err(Error::type_error("mode should be one of 'r', 'w' or 'rw'")),
        }
    }
}

/// Large object opened, created or imported through SQL functions.
#[derive(Debug)]
pub struct BasicLargeObject {
    connection: Arc<Connection>,
    oid: Oid,
    mode: LobMode,
    /// Descriptor from `lo_open`, `None` when not opened.
    fd: Option<i32>,
}

impl BasicLargeObject {
    /// Create or import the object when `args.oid` is 0, then open it.
    ///
    /// # Errors
    ///
    /// `Error::Programming` in autocommit mode, or the server's error.
    pub fn open(args: LobjectArgs<'_>) -> Result<Self> {
        let connection = args.connection;
        if connection.isolation_level() == IsolationLevel::Autocommit {
            return Err(Error::programming(
                "can't use a lobject outside of transactions",
            ));
        }

        let oid = if args.oid != 0 {
            args.oid
        } else if let Some(file) = args.new_file {
            let file = file.replace('\'', "''");
            query_number(connection, &format!("SELECT lo_import('{file}', {})", args.new_oid))?
        } else {
            query_number(connection, &format!("SELECT lo_create({})", args.new_oid))?
        };

        let fd = match args.mode {
            LobMode::NoOpen => None,
            mode => Some(query_number(
                connection,
                &format!("SELECT lo_open({oid}, {})", mode.flags()),
            )?),
        };
        tracing::debug!(oid, ?fd, mode = ?args.mode, "large object ready");

        Ok(Self {
            connection: Arc::clone(connection),
            oid,
            mode: args.mode,
            fd,
        })
    }

    #[must_use]
    pub const fn mode(&self) -> LobMode {
        self.mode
    }

    #[must_use]
    pub const fn fd(&self) -> Option<i32> {
        self.fd
    }

    #[must_use]
    pub const fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }
}

impl LargeObject for BasicLargeObject {
    fn connection_id(&self) -> ConnectionId {
        self.connection.id()
    }

    fn oid(&self) -> Oid {
        self.oid
    }
}

fn query_number<T: FromStr>(connection: &Connection, sql: &str) -> Result<T> {
    let result = connection.execute(sql)?;
    result
        .value(0, 0)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| Error::operational(format!("unexpected result from '{sql}'")))
}
