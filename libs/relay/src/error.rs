use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The connection is down, or went down while the call was in flight.
    Unavailable,
    Timeout,
    Rpc { code: i64, message: String },
    Malformed(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Unavailable => write!(f, "relay unavailable"),
            RelayError::Timeout => write!(f, "relay did not answer in time"),
            RelayError::Rpc { code, message } => write!(f, "relay error {}: {}", code, message),
            RelayError::Malformed(err) => write!(f, "malformed relay message: {}", err),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Malformed(err.to_string())
    }
}
