//! Error types for Bravefile loading.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised while reading, parsing or validating a Bravefile.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BravefileError {
    /// Raised when the file cannot be read.
    #[error("failed to read Bravefile {path}: {message}")]
    Read {
        /// Path that could not be read.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the YAML document is malformed.
    #[error("failed to parse Bravefile: {message}")]
    Parse {
        /// Parser error message.
        message: String,
    },
    /// Raised when a field violates a Bravefile invariant.
    #[error("invalid Bravefile field {field}: {message}")]
    Invalid {
        /// Dotted path of the offending field.
        field: String,
        /// Description of the violation.
        message: String,
    },
}

impl BravefileError {
    pub(crate) fn invalid(field: &str, message: &str) -> Self {
        Self::Invalid {
            field: field.to_owned(),
            message: message.to_owned(),
        }
    }
}
