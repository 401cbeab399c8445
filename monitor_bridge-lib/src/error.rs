use thiserror::Error;

/// Errors raised while reading a single segment of a frame.
///
/// None of these abort the message being built; the decoder logs them and
/// moves on to the next segment.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid date {value:?} in {segment} segment: {source}")]
    Date {
        segment: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("invalid integer {value:?} in {segment} segment: {source}")]
    Integer {
        segment: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("local time {0:?} does not exist or is ambiguous")]
    LocalTime(String),

    #[error("wave payload too short: {0} unstuffed bytes, need at least 8")]
    ShortWave(usize),
}

/// Errors returned by the connection session and the discovery listener.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by monitor")]
    Closed,
}
