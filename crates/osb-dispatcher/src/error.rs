use std::fmt;

/// Errors a [`crate::Dispatcher::dispatch`] call may return.
///
/// Both variants are per-order webhook failures: they feed the retry queue,
/// never the breaker (which guards upstream availability, not downstream).
#[derive(Debug)]
pub enum DispatchError {
    /// The request never reached the peer, or no response came back.
    Transport(String),
    /// The peer responded outside `[200, 300)`; `body` is truncated.
    Rejected { status: u16, body: String },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Transport(msg) => write!(f, "webhook transport error: {msg}"),
            DispatchError::Rejected { status, body } => {
                write!(f, "webhook rejected with status {status}: {body}")
            }
        }
    }
}

impl std::error::Error for DispatchError {}
