//! Poll-driven PostgreSQL client session handle.
//!
//! A [`Connection`] wraps one native session and runs it either blocking,
//! with every operation completing before it returns, or asynchronously,
//! driven step by step through [`Connection::poll`] from the caller's own
//! event loop. The wire protocol lives behind [`NativeSession`]; this crate
//! owns the handshake and setup state machine, the per-connection guard,
//! transaction control and the DB-API error taxonomy.
//!
//! # Example
//!
//! ```rust,ignore
//! use pgsession::{Connection, PollStatus};
//!
//! let conn = Connection::open(&connector, "dbname=app password=secret", true)?;
//! loop {
//!     match conn.poll()? {
//!         PollStatus::Ok => break,
//!         PollStatus::NeedRead => wait_readable(conn.fileno()?),
//!         PollStatus::NeedWrite => wait_writable(conn.fileno()?),
//!     }
//! }
//! println!("{conn}"); // Connection(dsn='dbname=app password=xxxxxx', closed=false)
//! ```

pub mod config;
pub mod connection;
pub mod cursor;
pub mod dsn;
mod error;
pub mod factory;
pub mod guard;
pub mod lobject;
pub mod logging;
pub mod native;
pub mod notice;
mod status;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{LoggingConfig, SessionConfig, SessionConfigBuilder, load_config};
pub use connection::{
    Connection, ConnectionBuilder, ConnectionId, DateStyle, QueryOwner, SessionInfo,
    normalize_encoding,
};
pub use cursor::BasicCursor;
pub use error::{Error, ErrorKind, Result};
pub use factory::{Cursor, LargeObject, LobjectArgs};
pub use guard::{Attached, Detach};
pub use lobject::{BasicLargeObject, LobMode, Oid};
pub use native::{Connector, NativeSession, Notification, QueryResult};
pub use notice::NoticeObserver;
pub use status::{ConnectionStatus, IsolationLevel, PollStatus, TransactionStatus};
