use crate::transport::{Response, TransportError};
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid declarative input: bad base URL scheme, bad route name,
    /// malformed template. Raised while a client is being declared,
    /// never during a call.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown route `{route}`")]
    UnknownRoute { route: String },

    #[error("route `{route}` is missing required argument `{name}`")]
    MissingArgument { route: String, name: String },

    /// A `{name}` path placeholder or a derived header/query value named a
    /// provider that is neither registered nor present in instance state.
    #[error("no provider or state entry named `{name}`")]
    UnresolvedValue { name: String },

    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("route `{route}` streams to {expected}; pass a matching stream target at call time")]
    MissingStreamTarget {
        route: String,
        expected: &'static str,
    },

    /// Network-level failure reported by the transport. Retried while the
    /// classification is transient and attempts remain.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Status outside the expected set, or a body that failed to decode.
    /// Carries the raw response for caller inspection. Never retried.
    #[error("unexpected response: {reason}")]
    UnexpectedResponse {
        reason: String,
        response: Box<Response>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the retry loop may re-dispatch after this failure.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_transient(),
            _ => false,
        }
    }

    pub(crate) fn unexpected_response(reason: impl Into<String>, response: Response) -> Self {
        Self::UnexpectedResponse {
            reason: reason.into(),
            response: Box::new(response),
        }
    }

    /// The raw response attached to an [`Error::UnexpectedResponse`].
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::UnexpectedResponse { response, .. } => Some(response),
            _ => None,
        }
    }
}
