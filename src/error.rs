//! Error types.

use std::fmt;

/// Failures that can occur while constructing the service.
///
/// Rate-limit rejection is deliberately not represented here: a 429 is
/// a normal response on the admission path, not an error. Everything in
/// this enum is fatal at startup and surfaced before any request is
/// served.
#[derive(Debug)]
pub enum Error {
    /// An invalid construction parameter or unparseable configuration.
    Config(String),
    /// The listener socket could not be created or bound.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Config(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
