// SPDX-License-Identifier: MPL-2.0
use std::fmt;

/// Crate-wide error type.
///
/// Poll failures are classified into the variants below; only [`Error::NotFound`]
/// is terminal for a watched pin (the thread is gone for good). Everything else
/// is reported and retried on the next scheduled poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Generic connectivity failure. Retried on the next scheduled poll.
    Network(String),

    /// Certificate or TLS handshake failure. Surfaced with a distinct message,
    /// but retried the same way as a network error.
    Tls(String),

    /// The thread no longer exists (HTTP 404). Terminal for a watched pin.
    NotFound,

    /// The response body could not be parsed. Surfaced, not terminal.
    Malformed(String),

    /// Configuration file could not be read or written.
    Config(String),

    /// Filesystem error outside of configuration handling.
    Io(String),
}

impl Error {
    /// Classifies a transport error from its message text.
    ///
    /// The HTTP client reports TLS problems as opaque connect errors, so the
    /// certificate cases are picked out by substring.
    pub fn from_transport_message(msg: &str) -> Self {
        let msg_lower = msg.to_lowercase();

        if msg_lower.contains("certificate")
            || msg_lower.contains("tls")
            || msg_lower.contains("ssl")
            || msg_lower.contains("handshake")
        {
            return Error::Tls(msg.to_string());
        }

        Error::Network(msg.to_string())
    }

    /// Returns whether a pin that hit this error should stop watching.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Network(e) => write!(f, "Network Error: {}", e),
            Error::Tls(e) => write!(f, "TLS Error: {}", e),
            Error::NotFound => write!(f, "Thread not found"),
            Error::Malformed(e) => write!(f, "Malformed response: {}", e),
            Error::Config(e) => write!(f, "Config Error: {}", e),
            Error::Io(e) => write!(f, "I/O Error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.status() == Some(reqwest::StatusCode::NOT_FOUND) {
            return Error::NotFound;
        }
        if err.is_decode() {
            return Error::Malformed(err.to_string());
        }
        Error::from_transport_message(&err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Malformed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
