//! Error classification: credential expiry vs. authorization denied.
//!
//! Upstream error shapes are inconsistent, so expiry detection is broad:
//! a structured code, an HTTP-equivalent status, or a message substring
//! all count.  Structured "forbidden" markers win over message
//! heuristics so a denial never loops into a refresh.

use crate::envelope::ServerError;

/// Case-insensitive substrings that mark a message as credential expiry.
const EXPIRY_MARKERS: [&str; 4] = [
    "unauthorized",
    "access denied",
    "invalid token",
    "expired token",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Recoverable by refreshing the credential and retrying.
    Expired,
    /// Authorization denied; terminal, never retried.
    Forbidden,
    /// Anything else; surfaced unchanged.
    Other,
}

/// Classify a single server error.
pub fn classify_one(err: &ServerError) -> ErrorClass {
    let code = err.code();
    let status = err.status_code();

    if code.is_some_and(|c| c.eq_ignore_ascii_case("unauthorized")) || status == Some(401) {
        return ErrorClass::Expired;
    }
    if code.is_some_and(|c| c.eq_ignore_ascii_case("forbidden")) || status == Some(403) {
        return ErrorClass::Forbidden;
    }

    let message = err.message.to_lowercase();
    if EXPIRY_MARKERS.iter().any(|m| message.contains(m)) {
        return ErrorClass::Expired;
    }
    ErrorClass::Other
}

/// Classify a whole error list.  Expiry anywhere in the list wins, then
/// forbidden, then other.
pub fn classify(errors: &[ServerError]) -> ErrorClass {
    let mut class = ErrorClass::Other;
    for err in errors {
        match classify_one(err) {
            ErrorClass::Expired => return ErrorClass::Expired,
            ErrorClass::Forbidden => class = ErrorClass::Forbidden,
            ErrorClass::Other => {}
        }
    }
    class
}
