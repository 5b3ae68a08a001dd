//! Cursor and large-object construction.
//!
//! Both go through a factory closure so callers can plug in their own
//! types. Whatever the factory builds must report that it belongs to the
//! connection that asked for it.

use std::fmt;
use std::sync::Arc;

use crate::connection::{Connection, ConnectionId};
use crate::cursor::BasicCursor;
use crate::error::{Error, Result};
use crate::lobject::{BasicLargeObject, LobMode, Oid};

/// Anything usable as a cursor.
pub trait Cursor: Send + Sync + fmt::Debug {
    /// Connection the cursor was created for.
    fn connection_id(&self) -> ConnectionId;

    /// Server-side cursor name, `None` for client-side cursors.
    fn name(&self) -> Option<&str>;
}

/// Anything usable as a large object.
pub trait LargeObject: Send + Sync + fmt::Debug {
    fn connection_id(&self) -> ConnectionId;

    fn oid(&self) -> Oid;
}

/// Arguments handed to a large-object factory.
#[derive(Debug)]
pub struct LobjectArgs<'a> {
    pub connection: &'a Arc<Connection>,
    /// Object to open, 0 to create one.
    pub oid: Oid,
    pub mode: LobMode,
    /// Requested oid for a newly created object, 0 to let the server pick.
    pub new_oid: Oid,
    /// File to import when creating.
    pub new_file: Option<&'a str>,
}

impl Connection {
    /// Create a [`BasicCursor`].
    ///
    /// # Errors
    ///
    /// `Error::Operational` while an async connection is still being set
    /// up, `Error::Programming` for a named cursor on an async connection.
    pub fn cursor(self: &Arc<Self>, name: Option<&str>) -> Result<Arc<BasicCursor>> {
        self.cursor_with(name, BasicCursor::new)
    }

    /// Create a cursor through `factory`.
    ///
    /// # Errors
    ///
    /// As [`cursor`](Self::cursor), plus `Error::Type` if the factory's
    /// product is not bound to this connection under the requested name.
    pub fn cursor_with<C, F>(self: &Arc<Self>, name: Option<&str>, factory: F) -> Result<Arc<C>>
    where
        C: Cursor,
        F: FnOnce(&Arc<Self>, Option<&str>) -> Result<C>,
    {
        self.locked(|state| {
            state.ensure_open()?;
            if !state.status.is_usable() {
                return Err(Error::operational("asynchronous connection attempt underway"));
            }
            Ok(())
        })?;
        if name.is_some() && self.is_async() {
            return Err(Error::programming(
                "asynchronous connections cannot produce named cursors",
            ));
        }

        let cursor = factory(self, name)?;
        if cursor.connection_id() != self.id() || cursor.name() != name {
            tracing::debug!(?cursor, "cursor factory returned a foreign cursor");
            return Err(Error::type_error(
                "cursor factory must return a cursor bound to this connection",
            ));
        }
        Ok(Arc::new(cursor))
    }

    /// Open or create a [`BasicLargeObject`].
    ///
    /// `mode` is one of `"r"`, `"w"`, `"rw"` or `"n"` (do not open),
    /// defaulting to `"r"`.
    ///
    /// # Errors
    ///
    /// `Error::Programming` on async connections, `Error::Type` for an
    /// unknown mode, or the server's error.
    pub fn lobject(
        self: &Arc<Self>,
        oid: Oid,
        mode: Option<&str>,
        new_oid: Oid,
        new_file: Option<&str>,
    ) -> Result<BasicLargeObject> {
        self.lobject_with(oid, mode, new_oid, new_file, BasicLargeObject::open)
    }

    /// Open or create a large object through `factory`.
    ///
    /// # Errors
    ///
    /// As [`lobject`](Self::lobject), plus `Error::Type` if the factory's
    /// product is not bound to this connection.
    pub fn lobject_with<L, F>(
        self: &Arc<Self>,
        oid: Oid,
        mode: Option<&str>,
        new_oid: Oid,
        new_file: Option<&str>,
        factory: F,
    ) -> Result<L>
    where
        L: LargeObject,
        F: FnOnce(LobjectArgs<'_>) -> Result<L>,
    {
        self.locked(|state| {
            state.ensure_open()?;
            self.ensure_sync("lobject")?;
            if !state.status.is_usable() {
                return Err(Error::operational("asynchronous connection attempt underway"));
            }
            Ok(())
        })?;
        let mode = mode.map_or(Ok(LobMode::Read), str::parse::<LobMode>)?;

        let lobject = factory(LobjectArgs {
            connection: self,
            oid,
            mode,
            new_oid,
            new_file,
        })?;
        if lobject.connection_id() != self.id() {
            tracing::debug!(?lobject, "lobject factory returned a foreign object");
            return Err(Error::type_error(
                "lobject factory must return a large object bound to this connection",
            ));
        }
        Ok(lobject)
    }
}
