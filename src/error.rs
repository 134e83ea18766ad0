//! Error types for the iptools library

use crate::mmdb::MmdbError;
use crate::network::CidrParseError;
use std::fmt;
use std::path::PathBuf;

/// Result type alias for iptools operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a whole operation
///
/// Row-level failures (an unparseable address, a corrupt field) never
/// surface here; they turn into null or default values instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A network literal in a matching set is not a valid CIDR range
    InvalidCidr(CidrParseError),

    /// A database could not be loaded
    Mmdb {
        /// File that failed
        path: PathBuf,
        /// Underlying failure
        source: MmdbError,
    },

    /// Configuration could not be resolved
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidCidr(err) => write!(f, "{}", err),
            Error::Mmdb { path, source } => {
                write!(f, "Failed to load {}: {}", path.display(), source)
            }
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidCidr(err) => Some(err),
            Error::Mmdb { source, .. } => Some(source),
            Error::Config(_) => None,
        }
    }
}

impl From<CidrParseError> for Error {
    fn from(err: CidrParseError) -> Self {
        Error::InvalidCidr(err)
    }
}
