use std::fmt;

/// Errors an [`crate::UpstreamClient`] call may return.
///
/// The Worker matches on this to decide breaker impact: `Transport`,
/// `Auth`, and `Malformed` count as hard failures; `RateLimited` aborts the
/// cycle without touching the breaker at all.
#[derive(Debug)]
pub enum UpstreamError {
    /// Network or transport failure (timeout, connection refused, TLS, …).
    Transport(String),
    /// Authentication failed or the cached session was rejected.
    Auth(String),
    /// The upstream returned HTTP 429; the Worker must abort the cycle
    /// without counting it as a breaker fault.
    RateLimited,
    /// The JSON-RPC reply could not be decoded into the expected shape.
    Malformed(String),
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamError::Transport(msg) => write!(f, "upstream transport error: {msg}"),
            UpstreamError::Auth(msg) => write!(f, "upstream authentication error: {msg}"),
            UpstreamError::RateLimited => write!(f, "upstream rate-limited (429)"),
            UpstreamError::Malformed(msg) => write!(f, "upstream malformed reply: {msg}"),
        }
    }
}

impl std::error::Error for UpstreamError {}

impl UpstreamError {
    /// `true` for error kinds the Worker must treat as a breaker hard
    /// failure (Transport, Auth, Malformed) as opposed to a rate-limit
    /// abort which leaves the breaker untouched.
    pub fn is_hard_failure(&self) -> bool {
        !matches!(self, UpstreamError::RateLimited)
    }
}
