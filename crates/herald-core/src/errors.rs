/// Core error type for the bot.
///
/// The adapter maps platform-specific errors into this type so the core can
/// handle failures consistently (user-facing rejection vs logged system error).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("could not parse time expression: {0}")]
    Parse(String),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A time expression that parsed fine but is unusable for scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("the scheduled time is in the past")]
    PastTime,

    #[error("the scheduled time is more than {max_days} days out")]
    TooFar { max_days: i64 },
}

pub type Result<T> = std::result::Result<T, Error>;
