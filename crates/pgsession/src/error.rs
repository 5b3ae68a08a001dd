//! Error types and the DB-API error taxonomy.
//!
//! Every failure surfaced by a [`Connection`](crate::Connection) maps onto
//! one DB-API 2.0 kind:
//! - `InterfaceError`: operation on a closed connection, driver misuse
//! - `OperationalError`: handshake or setup failure, lost connection
//! - `ProgrammingError`: operation not allowed in the current mode
//! - `IntegrityError`: constraint violation
//! - `DataError`: value conversion issues
//! - `NotSupportedError`: unsupported feature
//! - `InternalError`: server-side internal error
//!
//! `Value`, `Type` and `UnexpectedState` sit outside the taxonomy: the first
//! two reject bad arguments, the last reports a native result outside the
//! documented enumeration and always indicates a defect.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// DB-API 2.0 error kind.
///
/// The hierarchy is fixed at compile time; [`ErrorKind::ALL`] is the
/// registry handed out by [`Connection::error_kinds`](crate::Connection::error_kinds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Warning,
    Error,
    InterfaceError,
    DatabaseError,
    InternalError,
    OperationalError,
    ProgrammingError,
    IntegrityError,
    DataError,
    NotSupportedError,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Warning,
        Self::Error,
        Self::InterfaceError,
        Self::DatabaseError,
        Self::InternalError,
        Self::OperationalError,
        Self::ProgrammingError,
        Self::IntegrityError,
        Self::DataError,
        Self::NotSupportedError,
    ];

    /// DB-API name of this kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::InterfaceError => "InterfaceError",
            Self::DatabaseError => "DatabaseError",
            Self::InternalError => "InternalError",
            Self::OperationalError => "OperationalError",
            Self::ProgrammingError => "ProgrammingError",
            Self::IntegrityError => "IntegrityError",
            Self::DataError => "DataError",
            Self::NotSupportedError => "NotSupportedError",
        }
    }

    /// Direct parent in the hierarchy. `Warning` and `Error` are roots.
    #[must_use]
    pub const fn parent(self) -> Option<Self> {
        match self {
            Self::Warning | Self::Error => None,
            Self::InterfaceError | Self::DatabaseError => Some(Self::Error),
            Self::InternalError
            | Self::OperationalError
            | Self::ProgrammingError
            | Self::IntegrityError
            | Self::DataError
            | Self::NotSupportedError => Some(Self::DatabaseError),
        }
    }

    /// True if `self` is `ancestor` or descends from it.
    #[must_use]
    pub fn is_a(self, ancestor: Self) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == ancestor {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Session error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Database warning.
    #[error("Warning: {0}")]
    Warning(String),

    /// Interface error (closed connection, driver misuse).
    #[error("InterfaceError: {0}")]
    Interface(String),

    /// Generic database error with no more specific classification.
    #[error("DatabaseError: {0}")]
    Database(String),

    /// Internal error reported by the server.
    #[error("InternalError: {0}")]
    Internal(String),

    /// Operational error (handshake failure, lost connection).
    #[error("OperationalError: {0}")]
    Operational(String),

    /// Programming error (operation not valid in the current mode).
    #[error("ProgrammingError: {0}")]
    Programming(String),

    /// Integrity error (constraint violation).
    #[error("IntegrityError: {0}")]
    Integrity(String),

    /// Data error (value conversion issues).
    #[error("DataError: {0}")]
    Data(String),

    /// Not supported error (unsupported feature).
    #[error("NotSupportedError: {0}")]
    NotSupported(String),

    /// Argument outside its accepted range.
    #[error("ValueError: {0}")]
    Value(String),

    /// Object of the wrong kind, e.g. a factory product not bound to the connection.
    #[error("TypeError: {0}")]
    Type(String),

    /// Native layer returned a result outside its documented enumeration.
    #[error("unexpected state: {0}")]
    UnexpectedState(String),
}

impl Error {
    /// Create an interface error.
    #[must_use]
    pub fn interface(msg: impl Into<String>) -> Self {
        Self::Interface(msg.into())
    }

    /// Create a database error.
    #[must_use]
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an operational error.
    #[must_use]
    pub fn operational(msg: impl Into<String>) -> Self {
        Self::Operational(msg.into())
    }

    /// Create a programming error.
    #[must_use]
    pub fn programming(msg: impl Into<String>) -> Self {
        Self::Programming(msg.into())
    }

    /// Create an integrity error.
    #[must_use]
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    /// Create a data error.
    #[must_use]
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    /// Create a not supported error.
    #[must_use]
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    /// Create a value error.
    #[must_use]
    pub fn value(msg: impl Into<String>) -> Self {
        Self::Value(msg.into())
    }

    /// Create a type error.
    #[must_use]
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::Type(msg.into())
    }

    /// Create an unexpected-state error.
    #[must_use]
    pub fn unexpected_state(msg: impl Into<String>) -> Self {
        Self::UnexpectedState(msg.into())
    }

    /// Error raised by every operation on a closed connection.
    #[must_use]
    pub fn closed() -> Self {
        Self::interface("connection already closed")
    }

    /// Error raised when a blocking operation is attempted in async mode.
    #[must_use]
    pub fn async_forbidden(operation: &str) -> Self {
        Self::programming(format!("{operation} cannot be used in asynchronous mode"))
    }

    /// Taxonomy kind, or `None` for errors outside the DB-API hierarchy.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Warning(_) => Some(ErrorKind::Warning),
            Self::Interface(_) => Some(ErrorKind::InterfaceError),
            Self::Database(_) => Some(ErrorKind::DatabaseError),
            Self::Internal(_) => Some(ErrorKind::InternalError),
            Self::Operational(_) => Some(ErrorKind::OperationalError),
            Self::Programming(_) => Some(ErrorKind::ProgrammingError),
            Self::Integrity(_) => Some(ErrorKind::IntegrityError),
            Self::Data(_) => Some(ErrorKind::DataError),
            Self::NotSupported(_) => Some(ErrorKind::NotSupportedError),
            Self::Value(_) | Self::Type(_) | Self::UnexpectedState(_) => None,
        }
    }

    /// Message text without the kind prefix.
    ///
    /// For native failures this is the server's error text, verbatim.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Warning(msg)
            | Self::Interface(msg)
            | Self::Database(msg)
            | Self::Internal(msg)
            | Self::Operational(msg)
            | Self::Programming(msg)
            | Self::Integrity(msg)
            | Self::Data(msg)
            | Self::NotSupported(msg)
            | Self::Value(msg)
            | Self::Type(msg)
            | Self::UnexpectedState(msg) => msg,
        }
    }

    #[must_use]
    pub const fn is_interface(&self) -> bool {
        matches!(self, Self::Interface(_))
    }

    #[must_use]
    pub const fn is_operational(&self) -> bool {
        matches!(self, Self::Operational(_))
    }

    #[must_use]
    pub const fn is_programming(&self) -> bool {
        matches!(self, Self::Programming(_))
    }

    #[must_use]
    pub const fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    #[must_use]
    pub const fn is_unexpected_state(&self) -> bool {
        matches!(self, Self::UnexpectedState(_))
    }

    /// Classify a failed server command by its SQLSTATE.
    ///
    /// Only the two-character class is inspected. A missing or unknown
    /// state yields a plain `DatabaseError`.
    #[must_use]
    pub fn from_sqlstate(sqlstate: Option<&str>, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let Some(class) = sqlstate.and_then(|s| s.get(..2)) else {
            return Self::Database(msg);
        };

        match class {
            "0A" => Self::NotSupported(msg),
            "20" | "21" | "3D" | "3F" | "42" | "44" => Self::Programming(msg),
            "22" => Self::Data(msg),
            "23" => Self::Integrity(msg),
            "24" | "25" | "2B" | "2D" | "2F" | "38" | "39" | "3B" | "F0" | "P0" | "XX" => {
                Self::Internal(msg)
            }
            "08" | "26" | "27" | "28" | "34" | "40" | "53" | "54" | "55" | "57" | "58" => {
                Self::Operational(msg)
            }
            _ => Self::Database(msg),
        }
    }
}
