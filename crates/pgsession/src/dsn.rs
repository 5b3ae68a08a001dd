//! Display form of a connection string.
//!
//! The password never leaves the connector call: the connection keeps only
//! the redacted string produced here.

use url::Url;

const FILLER: char = 'x';
const PASSWORD_TOKEN: &str = "password";

/// Return `dsn` with its password value replaced by filler characters.
///
/// For `key=value` strings the first `password` token is located, the
/// token and the character after it (normally `=`) are kept, and every
/// following character up to the next space or the end of the string is
/// overwritten. URI-style strings additionally get the userinfo password
/// masked.
///
/// # Example
///
/// ```
/// use pgsession::dsn::redact;
///
/// assert_eq!(redact("host=db password=secret"), "host=db password=xxxxxx");
/// ```
#[must_use]
pub fn redact(dsn: &str) -> String {
    let redacted = redact_keyword(dsn);
    redact_uri_userinfo(&redacted).unwrap_or(redacted)
}

fn redact_keyword(dsn: &str) -> String {
    let Some(pos) = dsn.find(PASSWORD_TOKEN) else {
        return dsn.to_owned();
    };

    let (head, tail) = dsn.split_at(pos + PASSWORD_TOKEN.len());
    let mut out = String::with_capacity(dsn.len());
    out.push_str(head);

    let mut chars = tail.chars();
    // separator after the token
    if let Some(sep) = chars.next() {
        out.push(sep);
    }

    let mut masking = true;
    for c in chars {
        if masking && c == ' ' {
            masking = false;
        }
        out.push(if masking { FILLER } else { c });
    }
    out
}

fn redact_uri_userinfo(dsn: &str) -> Option<String> {
    if !(dsn.starts_with("postgres://") || dsn.starts_with("postgresql://")) {
        return None;
    }

    let mut url = Url::parse(dsn).ok()?;
    let password = url.password()?.to_owned();
    let filler: String = std::iter::repeat_n(FILLER, password.len()).collect();
    url.set_password(Some(&filler)).ok()?;
    Some(url.to_string())
}
