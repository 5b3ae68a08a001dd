use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use super::*;
use crate::config::SessionConfig;
use crate::native::HandshakePoll;
use crate::status::PollStatus;
use crate::testing::{ScriptedConnector, SessionScript};

const DSN: &str = "host=db dbname=test password=secret";

fn open_sync(script: SessionScript) -> (Arc<Connection>, ScriptedConnector) {
    let connector = ScriptedConnector::new(script);
    let conn = Connection::open(&connector, DSN, false).unwrap();
    (conn, connector)
}

fn open_async(script: SessionScript) -> (Arc<Connection>, ScriptedConnector) {
    let connector = ScriptedConnector::new(script);
    let conn = Connection::open(&connector, DSN, true).unwrap();
    (conn, connector)
}

fn drive(conn: &Connection) -> Vec<PollStatus> {
    let mut seen = Vec::new();
    loop {
        let status = conn.poll().unwrap();
        seen.push(status);
        if status == PollStatus::Ok {
            return seen;
        }
        assert!(seen.len() < 32, "poll did not converge: {seen:?}");
    }
}

#[derive(Default)]
struct Collector {
    outcomes: StdMutex<Vec<Result<Vec<QueryResult>>>>,
}

impl QueryOwner for Collector {
    fn query_complete(&self, outcome: Result<Vec<QueryResult>>) {
        self.outcomes.lock().unwrap().push(outcome);
    }
}

fn owner(collector: &Arc<Collector>) -> Weak<dyn QueryOwner> {
    let weak = Arc::downgrade(collector);
    let owner: Weak<dyn QueryOwner> = weak;
    owner
}

#[derive(Default)]
struct CountingDetach(AtomicUsize);

impl Detach for CountingDetach {
    fn detach(&self, f: &mut dyn FnMut()) {
        self.0.fetch_add(1, Ordering::SeqCst);
        f();
    }
}

#[test]
fn test_async_handshake_sequence() {
    let script = SessionScript::default().handshake([HandshakePoll::Writing, HandshakePoll::Ok]);
    let (conn, connector) = open_async(script);

    assert_eq!(conn.status(), ConnectionStatus::Setup);
    assert_eq!(
        drive(&conn),
        vec![
            PollStatus::NeedWrite,
            PollStatus::NeedWrite,
            PollStatus::NeedWrite,
            PollStatus::NeedRead,
            PollStatus::NeedWrite,
            PollStatus::NeedRead,
            PollStatus::Ok,
        ]
    );

    assert_eq!(conn.status(), ConnectionStatus::Ready);
    assert_eq!(conn.encoding().as_deref(), Some("UTF8"));
    assert_eq!(
        conn.datestyle(),
        Some(DateStyle {
            output: "ISO".into(),
            order: Some("MDY".into()),
        })
    );
    assert_eq!(conn.isolation_level(), IsolationLevel::Autocommit);
    assert_eq!(conn.standard_conforming_strings(), Some(true));
    assert_eq!(conn.server_version(), Some(160_002));
    assert_eq!(conn.protocol_version(), Some(3));
    assert!(!conn.isexecuting().unwrap());
    assert_eq!(
        conn.to_string(),
        "Connection(dsn='host=db dbname=test password=xxxxxx', closed=false)"
    );
    assert_eq!(connector.log().count("connect_poll"), 2);
    assert!(connector.log().contains("send_query:SHOW DATESTYLE"));
    assert!(connector.log().contains("send_query:SHOW client_encoding"));
}

#[test]
fn test_sync_open_runs_setup() {
    let (conn, connector) = open_sync(SessionScript::default());

    assert_eq!(conn.status(), ConnectionStatus::Ready);
    assert!(!conn.is_async());
    assert_eq!(conn.isolation_level(), IsolationLevel::ReadCommitted);
    assert_eq!(conn.encoding().as_deref(), Some("UTF8"));
    assert_eq!(conn.dsn(), "host=db dbname=test password=xxxxxx");
    assert_eq!(
        connector.log().calls(),
        vec!["connect", "exec:SHOW DATESTYLE", "exec:SHOW client_encoding"]
    );
    assert!(!conn.isexecuting().unwrap());
}

#[test]
fn test_standard_conforming_strings_off() {
    let script = SessionScript::default().parameter("standard_conforming_strings", "off");
    let (conn, _) = open_sync(script);
    assert_eq!(conn.standard_conforming_strings(), Some(false));
}

#[test]
fn test_connect_failure_is_operational() {
    let connector = ScriptedConnector::new(SessionScript::default().connect_error("no route"));
    let err = Connection::open(&connector, DSN, false).unwrap_err();
    assert!(err.is_operational());
    assert_eq!(err.message(), "no route");

    let err = Connection::open(&connector, DSN, true).unwrap_err();
    assert!(err.is_operational());
}

#[test]
fn test_handshake_failure_closes() {
    let script = SessionScript::default()
        .handshake([HandshakePoll::Reading, HandshakePoll::Failed])
        .handshake_error("FATAL:  password authentication failed");
    let (conn, connector) = open_async(script);

    assert_eq!(conn.poll().unwrap(), PollStatus::NeedWrite);
    assert_eq!(conn.poll().unwrap(), PollStatus::NeedRead);
    let err = conn.poll().unwrap_err();
    assert!(err.is_operational());
    assert_eq!(err.message(), "FATAL:  password authentication failed");

    assert!(conn.closed());
    assert_eq!(connector.log().count("finish"), 1);
    assert!(conn.poll().unwrap_err().is_interface());
}

#[test]
fn test_unknown_handshake_result() {
    let script = SessionScript::default().handshake([HandshakePoll::Unknown(42)]);
    let (conn, _) = open_async(script);

    conn.poll().unwrap();
    let err = conn.poll().unwrap_err();
    assert!(err.is_unexpected_state());
    assert!(!err.is_operational());
    assert!(conn.closed());
}

#[test]
fn test_datestyle_without_rows_closes() {
    let script = SessionScript::default().respond("SHOW DATESTYLE", QueryResult::tuples(Vec::new()));
    let (conn, connector) = open_async(script);

    let mut last = Ok(PollStatus::NeedWrite);
    for _ in 0..8 {
        last = conn.poll();
        if last.is_err() {
            break;
        }
    }
    let err = last.unwrap_err();
    assert_eq!(err.message(), "can't fetch datestyle");
    assert!(conn.closed());
    assert_eq!(conn.status(), ConnectionStatus::Closed);
    assert_eq!(connector.log().count("finish"), 1);
}

#[test]
fn test_encoding_server_error_closes() {
    let script = SessionScript::default().respond(
        "SHOW client_encoding",
        QueryResult::fatal("unrecognized configuration parameter", Some("42704")),
    );
    let (conn, _) = open_async(script);

    let err = std::iter::repeat_with(|| conn.poll())
        .take(10)
        .find_map(Result::err)
        .unwrap();
    assert!(err.is_operational());
    assert_eq!(err.message(), "unrecognized configuration parameter");
    assert!(conn.closed());
}

#[test]
fn test_sync_setup_failure_closes_session() {
    let script = SessionScript::default().fail("SHOW client_encoding", "server closed the connection");
    let connector = ScriptedConnector::new(script);
    let err = Connection::open(&connector, DSN, false).unwrap_err();
    assert!(err.is_operational());
    assert_eq!(connector.log().count("finish"), 1);
}

#[test]
fn test_pending_flush_passes_through_sent_state() {
    let script = SessionScript::default().flush_pending(1);
    let (conn, _) = open_async(script);

    conn.poll().unwrap();
    assert_eq!(conn.poll().unwrap(), PollStatus::NeedWrite);
    assert_eq!(conn.status(), ConnectionStatus::SendDatestyle);

    assert_eq!(conn.poll().unwrap(), PollStatus::NeedWrite);
    assert_eq!(conn.status(), ConnectionStatus::SentDatestyle);
    assert_eq!(conn.poll().unwrap(), PollStatus::NeedRead);
    assert_eq!(conn.status(), ConnectionStatus::GetDatestyle);
    assert!(conn.isexecuting().unwrap());
}

#[test]
fn test_busy_server_reports_need_read() {
    let script = SessionScript::default().busy_rounds(2);
    let (conn, _) = open_async(script);

    conn.poll().unwrap();
    conn.poll().unwrap();
    assert_eq!(conn.poll().unwrap(), PollStatus::NeedRead);
    assert_eq!(conn.poll().unwrap(), PollStatus::NeedRead);
    assert_eq!(conn.poll().unwrap(), PollStatus::NeedRead);
    assert_eq!(conn.status(), ConnectionStatus::GetDatestyle);
    assert_eq!(conn.poll().unwrap(), PollStatus::NeedWrite);
    assert_eq!(conn.status(), ConnectionStatus::SendClientEncoding);
}

#[test]
fn test_poll_on_ready_connection() {
    let (conn, _) = open_sync(SessionScript::default());
    assert_eq!(conn.poll().unwrap(), PollStatus::Ok);
}

#[test]
fn test_closed_connection_rejects_everything() {
    let (conn, connector) = open_sync(SessionScript::default());
    conn.close();
    conn.close();
    assert_eq!(connector.log().count("finish"), 1);

    assert!(conn.closed());
    assert_eq!(
        conn.to_string(),
        "Connection(dsn='host=db dbname=test password=xxxxxx', closed=true)"
    );
    assert!(conn.poll().unwrap_err().is_interface());
    assert!(conn.commit().unwrap_err().is_interface());
    assert!(conn.rollback().unwrap_err().is_interface());
    assert!(conn.reset().unwrap_err().is_interface());
    assert!(conn.set_isolation_level(1).unwrap_err().is_interface());
    assert!(conn.set_client_encoding("LATIN1").unwrap_err().is_interface());
    assert!(conn.get_transaction_status().unwrap_err().is_interface());
    assert!(conn.get_parameter_status("TimeZone").unwrap_err().is_interface());
    assert!(conn.get_backend_pid().unwrap_err().is_interface());
    assert!(conn.fileno().unwrap_err().is_interface());
    assert!(conn.isexecuting().unwrap_err().is_interface());
    assert!(conn.execute("SELECT 1").unwrap_err().is_interface());
    assert!(conn.lobject(0, None, 0, None).unwrap_err().is_interface());
    assert_eq!(
        conn.commit().unwrap_err().message(),
        "connection already closed"
    );
}

#[test]
fn test_closed_check_precedes_argument_validation() {
    let (conn, _) = open_sync(SessionScript::default());
    conn.close();
    assert!(conn.set_isolation_level(9).unwrap_err().is_interface());
}

#[test]
fn test_async_rejects_blocking_operations_without_io() {
    let (conn, connector) = open_async(SessionScript::default());
    drive(&conn);
    connector.log().clear();

    let rejected = [
        conn.commit(),
        conn.rollback(),
        conn.reset(),
        conn.set_isolation_level(1),
        conn.set_client_encoding("LATIN1"),
        conn.execute("SELECT 1").map(drop),
        conn.lobject(0, Some("rw"), 0, None).map(drop),
    ];
    for result in rejected {
        assert!(result.unwrap_err().is_programming());
    }
    assert!(connector.log().is_empty(), "{:?}", connector.log().calls());
    assert_eq!(conn.status(), ConnectionStatus::Ready);
    assert_eq!(
        conn.commit().unwrap_err().message(),
        "commit cannot be used in asynchronous mode"
    );
}

#[test]
fn test_async_argument_errors_come_after_mode_check() {
    let (conn, _) = open_async(SessionScript::default());
    drive(&conn);
    assert!(conn.set_isolation_level(7).unwrap_err().is_programming());
    assert!(conn.lobject(0, Some("bogus"), 0, None).unwrap_err().is_programming());
}

#[test]
fn test_isolation_level_out_of_range() {
    let (conn, connector) = open_sync(SessionScript::default());
    connector.log().clear();
    let err = conn.set_isolation_level(3).unwrap_err();
    assert!(matches!(err, Error::Value(_)));
    assert_eq!(err.message(), "isolation level out of bounds (0,3)");
    assert!(matches!(conn.set_isolation_level(-1), Err(Error::Value(_))));
    assert!(connector.log().is_empty());
    assert_eq!(conn.isolation_level(), IsolationLevel::ReadCommitted);
}

#[test]
fn test_transaction_lifecycle() {
    let (conn, connector) = open_sync(SessionScript::default());
    connector.log().clear();

    conn.commit().unwrap();
    conn.rollback().unwrap();
    assert!(connector.log().is_empty());

    conn.execute("INSERT INTO t VALUES (1)").unwrap();
    assert_eq!(conn.status(), ConnectionStatus::Begin);
    assert_eq!(
        conn.get_transaction_status().unwrap(),
        TransactionStatus::InTransaction
    );
    conn.execute("INSERT INTO t VALUES (2)").unwrap();
    assert_eq!(
        connector.log().count("exec:BEGIN; SET TRANSACTION ISOLATION LEVEL READ COMMITTED"),
        1
    );

    conn.commit().unwrap();
    assert!(connector.log().contains("exec:COMMIT"));
    assert_eq!(conn.status(), ConnectionStatus::Ready);
    assert_eq!(conn.get_transaction_status().unwrap(), TransactionStatus::Idle);
}

#[test]
fn test_commit_failure_keeps_transaction_open() {
    let script = SessionScript::default().respond(
        "COMMIT",
        QueryResult::fatal("could not serialize access", Some("40001")),
    );
    let (conn, _) = open_sync(script);
    conn.execute("UPDATE t SET x = 1").unwrap();

    let err = conn.commit().unwrap_err();
    assert!(err.is_operational());
    assert_eq!(conn.status(), ConnectionStatus::Begin);
    conn.rollback().unwrap();
    assert_eq!(conn.status(), ConnectionStatus::Ready);
}

#[test]
fn test_execute_classifies_server_errors() {
    let script = SessionScript::default().respond(
        "INSERT INTO t VALUES (1)",
        QueryResult::fatal("duplicate key value", Some("23505")),
    );
    let (conn, _) = open_sync(script);
    let err = conn.execute("INSERT INTO t VALUES (1)").unwrap_err();
    assert!(matches!(err, Error::Integrity(_)));
    assert_eq!(err.message(), "duplicate key value");
}

#[test]
fn test_autocommit_skips_begin() {
    let (conn, connector) = open_sync(SessionScript::default());
    conn.set_isolation_level(0).unwrap();
    conn.execute("SELECT 1").unwrap();
    assert_eq!(connector.log().count("exec:BEGIN"), 0);
    assert_eq!(conn.status(), ConnectionStatus::Ready);
}

#[test]
fn test_set_isolation_level_rolls_back_open_transaction() {
    let (conn, connector) = open_sync(SessionScript::default());
    conn.execute("SELECT 1").unwrap();
    assert_eq!(conn.status(), ConnectionStatus::Begin);

    conn.set_isolation_level(2).unwrap();
    assert!(connector.log().contains("exec:ROLLBACK"));
    assert_eq!(conn.status(), ConnectionStatus::Ready);
    assert_eq!(conn.isolation_level(), IsolationLevel::Serializable);

    conn.execute("SELECT 1").unwrap();
    assert!(
        connector
            .log()
            .contains("exec:BEGIN; SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
    );
}

#[test]
fn test_set_client_encoding() {
    let (conn, connector) = open_sync(SessionScript::default());
    connector.log().clear();

    conn.set_client_encoding("utf-8").unwrap();
    assert!(connector.log().is_empty());

    conn.execute("SELECT 1").unwrap();
    conn.set_client_encoding("latin_1").unwrap();
    assert!(connector.log().contains("exec:ROLLBACK"));
    assert!(connector.log().contains("exec:SET client_encoding = 'LATIN1'"));
    assert_eq!(conn.encoding().as_deref(), Some("LATIN1"));
    assert_eq!(conn.status(), ConnectionStatus::Ready);
}

#[test]
fn test_reset_restores_default_isolation() {
    let (conn, connector) = open_sync(SessionScript::default());
    conn.set_isolation_level(0).unwrap();
    connector.log().clear();

    conn.reset().unwrap();
    assert_eq!(
        connector.log().calls(),
        vec!["reset", "exec:SHOW DATESTYLE", "exec:SHOW client_encoding"]
    );
    assert_eq!(conn.isolation_level(), IsolationLevel::ReadCommitted);
    assert_eq!(conn.status(), ConnectionStatus::Ready);
}

#[test]
fn test_reset_failure_closes() {
    let (conn, _) = open_sync(SessionScript::default().reset_error("connection refused"));
    let err = conn.reset().unwrap_err();
    assert!(err.is_operational());
    assert!(conn.closed());
}

#[test]
fn test_close_after_failed_setup_clears_buffers() {
    let script = SessionScript::default()
        .notices_on("SHOW DATESTYLE", &["NOTICE:  datestyle\n"])
        .fail("SHOW client_encoding", "server closed the connection");
    let (conn, _) = open_async(script);

    let err = loop {
        match conn.poll() {
            Ok(_) => {}
            Err(err) => break err,
        }
    };
    assert!(err.is_operational());
    assert!(conn.closed());
    assert_eq!(conn.notices(), ["NOTICE:  datestyle\n"]);

    conn.close();
    assert!(conn.notices().is_empty());
    assert!(conn.notifies().is_empty());
}

#[test]
fn test_configured_default_isolation() {
    let config = SessionConfig::builder()
        .default_isolation_level(IsolationLevel::Serializable)
        .build();
    let connector = ScriptedConnector::default();
    let conn = Connection::open_with_config(&connector, DSN, false, &config).unwrap();
    assert_eq!(conn.isolation_level(), IsolationLevel::Serializable);

    let conn = Connection::open_with_config(&connector, DSN, true, &config).unwrap();
    drive(&conn);
    assert_eq!(conn.isolation_level(), IsolationLevel::Autocommit);
}

#[test]
fn test_isexecuting_tracks_handshake_and_queries() {
    let script = SessionScript::default().busy_rounds(1);
    let (conn, _) = open_async(script);
    assert!(conn.isexecuting().unwrap());
    drive(&conn);
    assert!(!conn.isexecuting().unwrap());

    let collector = Arc::new(Collector::default());
    conn.send_query("SELECT 1", owner(&collector)).unwrap();
    assert!(conn.isexecuting().unwrap());
    assert_eq!(conn.poll().unwrap(), PollStatus::NeedRead);
    assert!(conn.isexecuting().unwrap());
    assert_eq!(conn.poll().unwrap(), PollStatus::Ok);
    assert!(!conn.isexecuting().unwrap());
    assert_eq!(collector.outcomes.lock().unwrap().len(), 1);
}

#[test]
fn test_send_query_delivers_results() {
    let script = SessionScript::default()
        .respond("SELECT 1", QueryResult::tuples(vec![vec![Some("1".into())]]));
    let (conn, _) = open_async(script);
    drive(&conn);

    let collector = Arc::new(Collector::default());
    conn.send_query("SELECT 1", owner(&collector)).unwrap();
    assert_eq!(conn.poll().unwrap(), PollStatus::Ok);
    let outcomes = collector.outcomes.lock().unwrap();
    let results = outcomes[0].as_ref().unwrap();
    assert_eq!(results[0].value(0, 0), Some("1"));
}

#[test]
fn test_query_with_pending_output() {
    let (conn, _) = open_async(SessionScript::default().flush_pending(1));
    drive(&conn);

    let collector = Arc::new(Collector::default());
    conn.send_query("SELECT 1", owner(&collector)).unwrap();
    assert_eq!(conn.poll().unwrap(), PollStatus::NeedRead);
    assert_eq!(conn.poll().unwrap(), PollStatus::Ok);
    assert_eq!(collector.outcomes.lock().unwrap().len(), 1);
}

#[test]
fn test_second_send_query_rejected_without_io() {
    let (conn, connector) = open_async(SessionScript::default().busy_rounds(3));
    drive(&conn);

    let collector = Arc::new(Collector::default());
    conn.send_query("SELECT pg_sleep(1)", owner(&collector)).unwrap();
    connector.log().clear();

    let err = conn.send_query("SELECT 2", owner(&collector)).unwrap_err();
    assert!(err.is_programming());
    assert!(connector.log().is_empty());
}

#[test]
fn test_send_query_preconditions() {
    let (sync_conn, _) = open_sync(SessionScript::default());
    let collector = Arc::new(Collector::default());
    assert!(
        sync_conn
            .send_query("SELECT 1", owner(&collector))
            .unwrap_err()
            .is_programming()
    );

    let (conn, _) = open_async(SessionScript::default());
    let err = conn.send_query("SELECT 1", owner(&collector)).unwrap_err();
    assert!(err.is_operational());
}

#[test]
fn test_async_query_error_reaches_owner() {
    let script = SessionScript::default().respond(
        "INSERT INTO t VALUES (1)",
        QueryResult::fatal("null value violates not-null constraint", Some("23502")),
    );
    let (conn, _) = open_async(script);
    drive(&conn);

    let collector = Arc::new(Collector::default());
    conn.send_query("INSERT INTO t VALUES (1)", owner(&collector))
        .unwrap();
    assert_eq!(conn.poll().unwrap(), PollStatus::Ok);

    let outcomes = collector.outcomes.lock().unwrap();
    assert!(matches!(outcomes[0], Err(Error::Integrity(_))));
    assert!(!conn.isexecuting().unwrap());
}

#[test]
fn test_dropped_owner_discards_results() {
    let (conn, _) = open_async(SessionScript::default());
    drive(&conn);

    let collector = Arc::new(Collector::default());
    conn.send_query("SELECT 1", owner(&collector)).unwrap();
    drop(collector);
    assert_eq!(conn.poll().unwrap(), PollStatus::Ok);
    assert!(!conn.isexecuting().unwrap());
}

#[test]
fn test_notices_bounded_oldest_dropped() {
    let config = SessionConfig::builder()
        .notice_capacity(NonZeroUsize::new(3).unwrap())
        .build();
    let script = SessionScript::default().notices_on(
        "SELECT noisy()",
        &["n1", "n2", "n3", "n4", "n5"],
    );
    let connector = ScriptedConnector::new(script);
    let conn = Connection::open_with_config(&connector, DSN, false, &config).unwrap();

    conn.execute("SELECT noisy()").unwrap();
    assert_eq!(conn.notices(), vec!["n3", "n4", "n5"]);
}

#[test]
fn test_notice_observer_can_call_back_into_connection() {
    let script = SessionScript::default().notices_on("SELECT warn()", &["WARNING:  careful\n"]);
    let (conn, _) = open_sync(script);

    let seen = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let weak = Arc::downgrade(&conn);
    conn.add_notice_observer(Arc::new(move |notice: &str| {
        let pid = weak.upgrade().map(|c| c.get_backend_pid().unwrap());
        sink.lock().unwrap().push((notice.to_string(), pid));
    }));

    conn.execute("SELECT warn()").unwrap();
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        [("WARNING:  careful\n".to_string(), Some(4242))]
    );
    assert_eq!(conn.notices(), vec!["WARNING:  careful\n"]);
}

#[test]
fn test_notifications_collected_on_poll() {
    let script = SessionScript::default().notify(Notification {
        pid: 99,
        channel: "jobs".into(),
        payload: "42".into(),
    });
    let (conn, _) = open_sync(script);

    assert_eq!(conn.poll().unwrap(), PollStatus::Ok);
    assert_eq!(conn.notifies().len(), 1);
    let taken = conn.take_notifies();
    assert_eq!(taken[0].channel, "jobs");
    assert_eq!(taken[0].payload, "42");
    assert!(conn.take_notifies().is_empty());
}

#[test]
fn test_close_clears_buffers() {
    let script = SessionScript::default().notices_on("SELECT 1", &["hello"]);
    let (conn, _) = open_sync(script);
    conn.execute("SELECT 1").unwrap();
    assert_eq!(conn.notices().len(), 1);

    conn.close();
    assert!(conn.notices().is_empty());
    assert!(conn.notifies().is_empty());
}

#[test]
fn test_drop_finishes_session() {
    let connector = ScriptedConnector::default();
    let conn = Connection::open(&connector, DSN, false).unwrap();
    drop(conn);
    assert_eq!(connector.log().count("finish"), 1);
}

#[test]
fn test_handshake_poll_runs_detached() {
    let hook = Arc::new(CountingDetach::default());
    let conn = ConnectionBuilder::new(DSN)
        .async_mode(true)
        .detach(Arc::clone(&hook) as Arc<dyn Detach>)
        .open(&ScriptedConnector::default())
        .unwrap();

    conn.poll().unwrap();
    assert_eq!(hook.0.load(Ordering::SeqCst), 0);
    conn.poll().unwrap();
    assert_eq!(hook.0.load(Ordering::SeqCst), 1);
}

#[test]
fn test_blocking_open_runs_detached() {
    let hook = Arc::new(CountingDetach::default());
    let conn = ConnectionBuilder::new(DSN)
        .detach(Arc::clone(&hook) as Arc<dyn Detach>)
        .open(&ScriptedConnector::default())
        .unwrap();
    assert_eq!(hook.0.load(Ordering::SeqCst), 1);
    conn.commit().unwrap();
    assert_eq!(hook.0.load(Ordering::SeqCst), 2);
}

#[test]
fn test_connection_shared_across_threads() {
    let (conn, connector) = open_sync(SessionScript::default());
    conn.set_isolation_level(0).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let conn = Arc::clone(&conn);
            std::thread::spawn(move || {
                for j in 0..25 {
                    conn.execute(&format!("SELECT {i}, {j}")).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(connector.log().count("exec:SELECT "), 100);
}

#[test]
fn test_server_accessors() {
    let script = SessionScript::default().parameter("TimeZone", "UTC");
    let (conn, _) = open_sync(script);
    assert_eq!(conn.get_parameter_status("TimeZone").unwrap().as_deref(), Some("UTC"));
    assert_eq!(conn.get_parameter_status("missing").unwrap(), None);
    assert_eq!(conn.get_backend_pid().unwrap(), 4242);
    assert_eq!(conn.fileno().unwrap(), 7);
    assert_eq!(conn.error_kinds().len(), 10);
    assert!(conn.session_info().is_some());
}

#[test]
fn test_uri_dsn_is_redacted() {
    let connector = ScriptedConnector::default();
    let conn = Connection::open(&connector, "postgresql://app:hunter2@db/test", false).unwrap();
    assert!(!conn.dsn().contains("hunter2"));
    assert!(!format!("{conn:?}").contains("hunter2"));
}

#[test]
fn test_connection_ids_unique() {
    let connector = ScriptedConnector::default();
    let a = Connection::open(&connector, DSN, false).unwrap();
    let b = Connection::open(&connector, DSN, false).unwrap();
    assert_ne!(a.id(), b.id());
}
