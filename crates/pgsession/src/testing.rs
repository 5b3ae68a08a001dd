//! Scripted native session for tests.
//!
//! [`ScriptedConnector`] hands out [`ScriptedSession`]s that answer from a
//! [`SessionScript`] and record every native call in a shared [`CallLog`],
//! so tests can check both results and the exact I/O performed.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::native::{
    Connector, FlushStatus, HandshakePoll, NativeSession, Notification, QueryResult,
};
use crate::status::TransactionStatus;

/// Ordered record of native calls, shared by a connector and its sessions.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn record(&self, call: impl Into<String>) {
        self.0.lock().push(call.into());
    }

    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// True if `call` was recorded verbatim.
    #[must_use]
    pub fn contains(&self, call: &str) -> bool {
        self.0.lock().iter().any(|c| c == call)
    }

    /// Number of recorded calls starting with `prefix`.
    #[must_use]
    pub fn count(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// Canned server behavior.
#[derive(Debug, Clone)]
pub struct SessionScript {
    connect_error: Option<String>,
    handshake: VecDeque<HandshakePoll>,
    handshake_error: String,
    parameters: HashMap<String, String>,
    responses: HashMap<String, QueryResult>,
    failures: HashMap<String, String>,
    notices: HashMap<String, Vec<String>>,
    notifications: Vec<Notification>,
    busy_rounds: usize,
    flush_pending: usize,
    reset_error: Option<String>,
    server_version: i32,
    protocol_version: i32,
    backend_pid: i32,
    socket: i32,
}

impl Default for SessionScript {
    fn default() -> Self {
        let parameters = HashMap::from([(
            "standard_conforming_strings".to_string(),
            "on".to_string(),
        )]);
        let responses = HashMap::from([
            ("SHOW DATESTYLE".to_string(), single("ISO, MDY")),
            ("SHOW client_encoding".to_string(), single("UTF8")),
        ]);
        Self {
            connect_error: None,
            handshake: VecDeque::new(),
            handshake_error: String::new(),
            parameters,
            responses,
            failures: HashMap::new(),
            notices: HashMap::new(),
            notifications: Vec::new(),
            busy_rounds: 0,
            flush_pending: 0,
            reset_error: None,
            server_version: 160_002,
            protocol_version: 3,
            backend_pid: 4242,
            socket: 7,
        }
    }
}

fn single(value: &str) -> QueryResult {
    QueryResult::tuples(vec![vec![Some(value.to_string())]])
}

impl SessionScript {
    /// Fail `connect` / `connect_start` with `message`.
    #[must_use]
    pub fn connect_error(mut self, message: &str) -> Self {
        self.connect_error = Some(message.to_string());
        self
    }

    /// Results of successive handshake polls; `Ok` once exhausted.
    #[must_use]
    pub fn handshake(mut self, steps: impl IntoIterator<Item = HandshakePoll>) -> Self {
        self.handshake = steps.into_iter().collect();
        self
    }

    /// Text reported by `error_message` after a failed handshake.
    #[must_use]
    pub fn handshake_error(mut self, message: &str) -> Self {
        self.handshake_error = message.to_string();
        self
    }

    #[must_use]
    pub fn parameter(mut self, name: &str, value: &str) -> Self {
        self.parameters.insert(name.to_string(), value.to_string());
        self
    }

    /// Answer `sql` with `result`. Unlisted statements succeed without rows.
    #[must_use]
    pub fn respond(mut self, sql: &str, result: QueryResult) -> Self {
        self.responses.insert(sql.to_string(), result);
        self
    }

    /// Fail `sql` at the transport level.
    #[must_use]
    pub fn fail(mut self, sql: &str, message: &str) -> Self {
        self.failures.insert(sql.to_string(), message.to_string());
        self
    }

    /// Emit `notices` while `sql` runs.
    #[must_use]
    pub fn notices_on(mut self, sql: &str, notices: &[&str]) -> Self {
        self.notices
            .insert(sql.to_string(), notices.iter().map(ToString::to_string).collect());
        self
    }

    /// Deliver `notification` on the first `consume_input`.
    #[must_use]
    pub fn notify(mut self, notification: Notification) -> Self {
        self.notifications.push(notification);
        self
    }

    /// Reads that still leave the session busy after each sent statement.
    #[must_use]
    pub const fn busy_rounds(mut self, rounds: usize) -> Self {
        self.busy_rounds = rounds;
        self
    }

    /// Flushes that report pending output after each sent statement.
    #[must_use]
    pub const fn flush_pending(mut self, flushes: usize) -> Self {
        self.flush_pending = flushes;
        self
    }

    #[must_use]
    pub fn reset_error(mut self, message: &str) -> Self {
        self.reset_error = Some(message.to_string());
        self
    }

    #[must_use]
    pub const fn server_version(mut self, version: i32) -> Self {
        self.server_version = version;
        self
    }

    fn response(&self, sql: &str) -> QueryResult {
        self.responses
            .get(sql)
            .cloned()
            .unwrap_or_else(QueryResult::command_ok)
    }
}

/// Connector producing [`ScriptedSession`]s.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    script: SessionScript,
    log: CallLog,
}

impl ScriptedConnector {
    #[must_use]
    pub fn new(script: SessionScript) -> Self {
        Self {
            script,
            log: CallLog::default(),
        }
    }

    /// Calls made by every session this connector created.
    #[must_use]
    pub fn log(&self) -> &CallLog {
        &self.log
    }

    fn session(&self, handshake: VecDeque<HandshakePoll>) -> Result<Box<dyn NativeSession>, String> {
        if let Some(err) = &self.script.connect_error {
            return Err(err.clone());
        }
        let mut script = self.script.clone();
        script.handshake = handshake;
        let notifications = std::mem::take(&mut script.notifications);
        Ok(Box::new(ScriptedSession {
            script,
            log: self.log.clone(),
            results: VecDeque::new(),
            busy_left: 0,
            flush_left: 0,
            notices: Vec::new(),
            incoming: notifications.into(),
            delivered: Vec::new(),
            transaction: TransactionStatus::Idle,
        }))
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, _dsn: &str) -> Result<Box<dyn NativeSession>, String> {
        self.log.record("connect");
        self.session(VecDeque::new())
    }

    fn connect_start(&self, _dsn: &str) -> Result<Box<dyn NativeSession>, String> {
        self.log.record("connect_start");
        self.session(self.script.handshake.clone())
    }
}

/// Native session answering from a [`SessionScript`].
#[derive(Debug)]
pub struct ScriptedSession {
    script: SessionScript,
    log: CallLog,
    results: VecDeque<QueryResult>,
    busy_left: usize,
    flush_left: usize,
    notices: Vec<String>,
    incoming: VecDeque<Notification>,
    delivered: Vec<Notification>,
    transaction: TransactionStatus,
}

impl ScriptedSession {
    fn run(&mut self, sql: &str) -> Result<QueryResult, String> {
        if let Some(err) = self.script.failures.get(sql) {
            return Err(err.clone());
        }
        if let Some(notices) = self.script.notices.get(sql) {
            self.notices.extend(notices.iter().cloned());
        }
        let result = self.script.response(sql);
        if result.is_error() {
            if self.transaction == TransactionStatus::InTransaction {
                self.transaction = TransactionStatus::InError;
            }
        } else if sql.starts_with("BEGIN") {
            self.transaction = TransactionStatus::InTransaction;
        } else if sql == "COMMIT" || sql == "ROLLBACK" {
            self.transaction = TransactionStatus::Idle;
        }
        Ok(result)
    }
}

impl NativeSession for ScriptedSession {
    fn connect_poll(&mut self) -> HandshakePoll {
        self.log.record("connect_poll");
        self.script.handshake.pop_front().unwrap_or(HandshakePoll::Ok)
    }

    fn error_message(&self) -> String {
        self.script.handshake_error.clone()
    }

    fn parameter_status(&self, name: &str) -> Option<String> {
        self.script.parameters.get(name).cloned()
    }

    fn protocol_version(&self) -> i32 {
        self.script.protocol_version
    }

    fn server_version(&self) -> i32 {
        self.script.server_version
    }

    fn backend_pid(&self) -> i32 {
        self.script.backend_pid
    }

    fn socket(&self) -> i32 {
        self.script.socket
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.transaction
    }

    fn send_query(&mut self, sql: &str) -> Result<(), String> {
        self.log.record(format!("send_query:{sql}"));
        let result = self.run(sql)?;
        self.results.push_back(result);
        self.busy_left = self.script.busy_rounds + 1;
        self.flush_left = self.script.flush_pending;
        Ok(())
    }

    fn flush(&mut self) -> Result<FlushStatus, String> {
        self.log.record("flush");
        if self.flush_left > 0 {
            self.flush_left -= 1;
            Ok(FlushStatus::Pending)
        } else {
            Ok(FlushStatus::Done)
        }
    }

    fn consume_input(&mut self) -> Result<(), String> {
        self.log.record("consume_input");
        self.busy_left = self.busy_left.saturating_sub(1);
        self.delivered.extend(self.incoming.drain(..));
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.busy_left > 0
    }

    fn get_result(&mut self) -> Option<QueryResult> {
        self.results.pop_front()
    }

    fn exec(&mut self, sql: &str) -> Result<QueryResult, String> {
        self.log.record(format!("exec:{sql}"));
        self.run(sql)
    }

    fn reset(&mut self) -> Result<(), String> {
        self.log.record("reset");
        self.transaction = TransactionStatus::Idle;
        self.script.reset_error.clone().map_or(Ok(()), Err)
    }

    fn finish(&mut self) {
        self.log.record("finish");
    }

    fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.delivered)
    }
}
