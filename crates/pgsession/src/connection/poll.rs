//! Non-blocking state machine behind [`Connection::poll`].

use std::sync::Weak;

use super::setup::{self, SetupParam};
use super::{Connection, QueryOwner, QueryPhase, SessionState};
use crate::error::{Error, Result};
use crate::native::{FlushStatus, HandshakePoll, QueryResult};
use crate::status::{ConnectionStatus, IsolationLevel, PollStatus};

/// Results of a finished async query, delivered once the guard is released.
struct Completion {
    owner: Weak<dyn QueryOwner>,
    outcome: Result<Vec<QueryResult>>,
}

impl Completion {
    fn deliver(self) {
        match self.owner.upgrade() {
            Some(owner) => owner.query_complete(self.outcome),
            None => tracing::debug!("query owner dropped, discarding results"),
        }
    }
}

struct Step {
    result: Result<PollStatus>,
    completion: Option<Completion>,
}

impl From<Result<PollStatus>> for Step {
    fn from(result: Result<PollStatus>) -> Self {
        Self {
            result,
            completion: None,
        }
    }
}

impl Connection {
    /// Advance the connection by one non-blocking step.
    ///
    /// Drives the handshake and setup of an async connection, then any
    /// query submitted with [`send_query`](Self::send_query). The returned
    /// [`PollStatus`] tells the caller what to wait for on
    /// [`fileno`](Self::fileno) before polling again.
    pub fn poll(&self) -> Result<PollStatus> {
        let isolation = self.setup_isolation();
        let async_mode = self.async_mode;
        let step = if self.status() == ConnectionStatus::Async {
            // the native handshake poll may block on name resolution
            self.detached(|state| advance(state, async_mode, isolation))
        } else {
            self.locked(|state| advance(state, async_mode, isolation))
        };

        if let Some(completion) = step.completion {
            completion.deliver();
        }
        step.result
    }
}

fn advance(state: &mut SessionState, async_mode: bool, isolation: IsolationLevel) -> Step {
    let status = state.status;
    let result = match status {
        ConnectionStatus::Closed => Err(Error::closed()),
        ConnectionStatus::Setup if async_mode => {
            state.advance(ConnectionStatus::Async);
            Ok(PollStatus::NeedWrite)
        }
        ConnectionStatus::Async => handshake(state),
        ConnectionStatus::SendDatestyle | ConnectionStatus::SentDatestyle => {
            setup::send_step(state, SetupParam::DateStyle)
        }
        ConnectionStatus::GetDatestyle => setup::fetch_step(state, SetupParam::DateStyle, isolation),
        ConnectionStatus::SendClientEncoding | ConnectionStatus::SentClientEncoding => {
            setup::send_step(state, SetupParam::ClientEncoding)
        }
        ConnectionStatus::GetClientEncoding => {
            setup::fetch_step(state, SetupParam::ClientEncoding, isolation)
        }
        ConnectionStatus::Ready | ConnectionStatus::Begin => return ready(state),
        ConnectionStatus::Setup => Err(Error::programming(
            "poll() called on a connection with no asynchronous attempt",
        )),
    };

    if let Err(err) = &result
        && async_mode
        && status.is_connecting()
    {
        tracing::warn!(%status, error = %err, "connection setup failed, closing");
        state.teardown();
    }
    result.into()
}

fn handshake(state: &mut SessionState) -> Result<PollStatus> {
    let outcome = state.session_mut()?.connect_poll();
    tracing::trace!(?outcome, "handshake poll");
    match outcome {
        HandshakePoll::Reading => Ok(PollStatus::NeedRead),
        HandshakePoll::Writing => Ok(PollStatus::NeedWrite),
        HandshakePoll::Failed => Err(Error::operational(state.session_ref()?.error_message())),
        HandshakePoll::Ok => {
            setup::record_handshake(state)?;
            state.advance(ConnectionStatus::SendDatestyle);
            Ok(PollStatus::NeedWrite)
        }
        HandshakePoll::Unknown(code) => Err(Error::unexpected_state(format!(
            "unexpected result from handshake poll: {code}"
        ))),
    }
}

fn ready(state: &mut SessionState) -> Step {
    let Some(session) = state.session.as_mut() else {
        return Step::from(Err(Error::closed()));
    };
    let Some(flight) = state.in_flight.as_mut() else {
        // nothing in flight: just pick up notifications
        return session
            .consume_input()
            .map(|()| PollStatus::Ok)
            .map_err(Error::operational)
            .into();
    };

    match flight.phase {
        QueryPhase::Flushing => match session.flush() {
            Ok(FlushStatus::Pending) => Ok(PollStatus::NeedWrite).into(),
            Ok(FlushStatus::Done) => {
                flight.phase = QueryPhase::Reading;
                Ok(PollStatus::NeedRead).into()
            }
            Err(message) => abandon(state, message),
        },
        QueryPhase::Reading => {
            if let Err(message) = session.consume_input() {
                return abandon(state, message);
            }
            if session.is_busy() {
                return Ok(PollStatus::NeedRead).into();
            }
            let mut results = Vec::new();
            while let Some(result) = session.get_result() {
                results.push(result);
            }
            let completion = state.in_flight.take().map(|flight| Completion {
                owner: flight.owner,
                outcome: collect(results),
            });
            tracing::debug!("async query complete");
            Step {
                result: Ok(PollStatus::Ok),
                completion,
            }
        }
    }
}

/// Drop the in-flight query after a transport failure, telling its owner.
fn abandon(state: &mut SessionState, message: String) -> Step {
    let err = Error::operational(message);
    let completion = state.in_flight.take().map(|flight| Completion {
        owner: flight.owner,
        outcome: Err(err.clone()),
    });
    Step {
        result: Err(err),
        completion,
    }
}

fn collect(results: Vec<QueryResult>) -> Result<Vec<QueryResult>> {
    let failed = results
        .iter()
        .find(|r| r.is_error())
        .and_then(|r| r.error.as_ref());
    match failed {
        Some(err) => Err(Error::from_sqlstate(
            err.sqlstate.as_deref(),
            err.message.clone(),
        )),
        None => Ok(results),
    }
}
