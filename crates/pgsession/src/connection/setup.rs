//! Post-handshake session setup.
//!
//! After the handshake the connection asks the server for its date style
//! and client encoding. Async connections run each query as a sequence of
//! poll steps; blocking `open` and `reset` run the same queries through
//! [`run_blocking`].

use std::fmt;
use std::str::FromStr;

use super::{SessionInfo, SessionState, SetupProgress};
use crate::error::{Error, Result};
use crate::native::{FlushStatus, QueryResult, ResultStatus};
use crate::status::{ConnectionStatus, IsolationLevel, PollStatus};

/// Server `DateStyle` setting, e.g. `ISO, MDY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateStyle {
    /// Output format (`ISO`, `Postgres`, `SQL`, `German`).
    pub output: String,
    /// Field order (`MDY`, `DMY`, `YMD`) when reported.
    pub order: Option<String>,
}

impl FromStr for DateStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(',').map(str::trim);
        let output = parts.next().filter(|p| !p.is_empty()).ok_or_else(|| {
            Error::operational(format!("can't parse datestyle '{s}'"))
        })?;
        let order = parts.next().filter(|p| !p.is_empty()).map(str::to_owned);
        Ok(Self {
            output: output.to_owned(),
            order,
        })
    }
}

impl fmt::Display for DateStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.order {
            Some(order) => write!(f, "{}, {order}", self.output),
            None => f.write_str(&self.output),
        }
    }
}

/// Canonical form of an encoding name: upper-cased, `-` and `_` removed.
///
/// ```
/// assert_eq!(pgsession::normalize_encoding("utf-8"), "UTF8");
/// assert_eq!(pgsession::normalize_encoding("Latin_1"), "LATIN1");
/// ```
#[must_use]
pub fn normalize_encoding(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '-' | '_'))
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// One setup query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SetupParam {
    DateStyle,
    ClientEncoding,
}

const SETUP_SEQUENCE: [SetupParam; 2] = [SetupParam::DateStyle, SetupParam::ClientEncoding];

impl SetupParam {
    const fn query(self) -> &'static str {
        match self {
            Self::DateStyle => "SHOW DATESTYLE",
            Self::ClientEncoding => "SHOW client_encoding",
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::DateStyle => "datestyle",
            Self::ClientEncoding => "client_encoding",
        }
    }

    const fn send_status(self) -> ConnectionStatus {
        match self {
            Self::DateStyle => ConnectionStatus::SendDatestyle,
            Self::ClientEncoding => ConnectionStatus::SendClientEncoding,
        }
    }

    const fn sent_status(self) -> ConnectionStatus {
        match self {
            Self::DateStyle => ConnectionStatus::SentDatestyle,
            Self::ClientEncoding => ConnectionStatus::SentClientEncoding,
        }
    }

    const fn get_status(self) -> ConnectionStatus {
        match self {
            Self::DateStyle => ConnectionStatus::GetDatestyle,
            Self::ClientEncoding => ConnectionStatus::GetClientEncoding,
        }
    }

    /// Extract the single value from `result` and record it.
    fn apply(self, progress: &mut SetupProgress, result: Option<&QueryResult>) -> Result<()> {
        let value = single_value(self, result)?;
        match self {
            Self::DateStyle => progress.datestyle = Some(value.parse()?),
            Self::ClientEncoding => progress.encoding = Some(value.to_ascii_uppercase()),
        }
        tracing::debug!(parameter = self.name(), value, "setup parameter received");
        Ok(())
    }
}

fn single_value(param: SetupParam, result: Option<&QueryResult>) -> Result<&str> {
    let cant_fetch = || Error::operational(format!("can't fetch {}", param.name()));
    let result = result.ok_or_else(cant_fetch)?;
    if let Some(err) = result.error.as_ref().filter(|_| result.is_error()) {
        return Err(Error::operational(err.message.clone()));
    }
    if result.status != ResultStatus::TuplesOk || result.rows.len() != 1 {
        return Err(cant_fetch());
    }
    result.value(0, 0).ok_or_else(cant_fetch)
}

/// Record what the handshake told us about the server.
pub(crate) fn record_handshake(state: &mut SessionState) -> Result<()> {
    let session = state.session_ref()?;
    let progress = SetupProgress {
        standard_conforming_strings: session
            .parameter_status("standard_conforming_strings")
            .is_some_and(|v| v == "on"),
        server_version: session.server_version(),
        protocol_version: session.protocol_version(),
        ..SetupProgress::default()
    };
    state.progress = progress;
    Ok(())
}

/// Async sub-step for the `Send*` and `Sent*` states.
pub(crate) fn send_step(state: &mut SessionState, param: SetupParam) -> Result<PollStatus> {
    let submit = state.status == param.send_status();
    let flushed = {
        let session = state.session_mut()?;
        if submit {
            tracing::trace!(sql = param.query(), "sending setup query");
            session.send_query(param.query()).map_err(Error::operational)?;
        }
        session.flush().map_err(Error::operational)?
    };
    match flushed {
        FlushStatus::Done => {
            state.advance(param.get_status());
            Ok(PollStatus::NeedRead)
        }
        FlushStatus::Pending => {
            if submit {
                state.advance(param.sent_status());
            }
            Ok(PollStatus::NeedWrite)
        }
    }
}

/// Async sub-step for the `Get*` states.
pub(crate) fn fetch_step(
    state: &mut SessionState,
    param: SetupParam,
    isolation: IsolationLevel,
) -> Result<PollStatus> {
    let last = {
        let session = state.session_mut()?;
        session.consume_input().map_err(Error::operational)?;
        if session.is_busy() {
            return Ok(PollStatus::NeedRead);
        }
        let mut last = None;
        while let Some(result) = session.get_result() {
            last = Some(result);
        }
        last
    };
    param.apply(&mut state.progress, last.as_ref())?;
    match param {
        SetupParam::DateStyle => {
            state.advance(SetupParam::ClientEncoding.send_status());
            Ok(PollStatus::NeedWrite)
        }
        SetupParam::ClientEncoding => {
            finish(state, isolation)?;
            Ok(PollStatus::Ok)
        }
    }
}

/// Run the whole setup with blocking commands.
pub(crate) fn run_blocking(state: &mut SessionState, isolation: IsolationLevel) -> Result<()> {
    record_handshake(state)?;
    for param in SETUP_SEQUENCE {
        let result = state
            .session_mut()?
            .exec(param.query())
            .map_err(Error::operational)?;
        param.apply(&mut state.progress, Some(&result))?;
    }
    finish(state, isolation)
}

fn finish(state: &mut SessionState, isolation: IsolationLevel) -> Result<()> {
    let progress = std::mem::take(&mut state.progress);
    let datestyle = progress
        .datestyle
        .ok_or_else(|| Error::operational("can't fetch datestyle"))?;
    let encoding = progress
        .encoding
        .ok_or_else(|| Error::operational("can't fetch client_encoding"))?;
    state.info = Some(SessionInfo {
        datestyle,
        encoding,
        server_version: progress.server_version,
        protocol_version: progress.protocol_version,
        standard_conforming_strings: progress.standard_conforming_strings,
    });
    state.isolation_level = isolation;
    state.advance(ConnectionStatus::Ready);
    Ok(())
}
