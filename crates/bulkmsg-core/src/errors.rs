/// Core error type for the dispatch engine.
///
/// Adapter crates map their transport errors into `Transport` so the
/// controllers can tell per-recipient failures apart from caller misuse.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("cannot {operation} while {state}")]
    State {
        operation: &'static str,
        state: String,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn state(operation: &'static str, state: impl std::fmt::Display) -> Self {
        Self::State {
            operation,
            state: state.to_string(),
        }
    }

    /// True for failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
