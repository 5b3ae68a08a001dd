//! Default cursor.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::connection::{Connection, ConnectionId, QueryOwner};
use crate::error::{Error, Result};
use crate::factory::Cursor;
use crate::native::QueryResult;
use crate::status::IsolationLevel;

#[derive(Debug, Default)]
struct CursorState {
    outcome: Option<Result<Vec<QueryResult>>>,
    executing: bool,
}

/// Minimal cursor keeping raw server results.
///
/// On blocking connections [`execute`](Self::execute) runs to completion.
/// On async connections it only submits the statement; the results arrive
/// once the connection's `poll()` reports [`PollStatus::Ok`](crate::PollStatus::Ok).
#[derive(Debug)]
pub struct BasicCursor {
    connection: Arc<Connection>,
    name: Option<String>,
    state: Mutex<CursorState>,
}

impl BasicCursor {
    pub fn new(connection: &Arc<Connection>, name: Option<&str>) -> Result<Self> {
        Ok(Self {
            connection: Arc::clone(connection),
            name: name.map(str::to_owned),
            state: Mutex::new(CursorState::default()),
        })
    }

    #[must_use]
    pub const fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Run `sql`, or submit it on an async connection.
    ///
    /// Named cursors declare a server-side cursor and need an open
    /// transaction, so they are rejected in autocommit mode.
    pub fn execute(self: &Arc<Self>, sql: &str) -> Result<()> {
        if self.connection.is_async() {
            let weak = Arc::downgrade(self);
            let owner: Weak<dyn QueryOwner> = weak;
            // results may arrive before send_query returns
            let previous = std::mem::replace(
                &mut *self.state.lock(),
                CursorState {
                    outcome: None,
                    executing: true,
                },
            );
            if let Err(err) = self.connection.send_query(sql, owner) {
                *self.state.lock() = previous;
                return Err(err);
            }
            return Ok(());
        }

        let outcome = match &self.name {
            Some(name) => {
                if self.connection.isolation_level() == IsolationLevel::Autocommit {
                    return Err(Error::programming(
                        "can't use a named cursor outside of transactions",
                    ));
                }
                let quoted = name.replace('"', "\"\"");
                self.connection
                    .execute(&format!("DECLARE \"{quoted}\" CURSOR WITHOUT HOLD FOR {sql}"))
            }
            None => self.connection.execute(sql),
        }
        .map(|result| vec![result]);

        let failed = outcome.as_ref().err().cloned();
        *self.state.lock() = CursorState {
            outcome: Some(outcome),
            executing: false,
        };
        failed.map_or(Ok(()), Err)
    }

    /// True while an async statement has not completed.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.state.lock().executing
    }

    /// Results of the last statement, or its error.
    ///
    /// Empty before anything has been executed or while an async statement
    /// is still running.
    pub fn results(&self) -> Result<Vec<QueryResult>> {
        self.state
            .lock()
            .outcome
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

impl Cursor for BasicCursor {
    fn connection_id(&self) -> ConnectionId {
        self.connection.id()
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl QueryOwner for BasicCursor {
    fn query_complete(&self, outcome: Result<Vec<QueryResult>>) {
        tracing::trace!(ok = outcome.is_ok(), "cursor received results");
        *self.state.lock() = CursorState {
            outcome: Some(outcome),
            executing: false,
        };
    }
}
