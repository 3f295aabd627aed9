//! Error types for the terminology reference pipeline.
//!
//! All public functions in `termspec-core` return [`Result<T>`] so callers get a
//! single error type to match on. Fatal configuration errors
//! ([`Error::ManifestMissing`], [`Error::ManifestInvalid`],
//! [`Error::OutputPathUnwritable`]) should abort the build; everything else the
//! pipeline can encounter (a remote spec being unreachable, a malformed tag) is
//! recorded as a [`crate::findings::Finding`] instead of being propagated as an
//! `Error` -- see `findings.rs` for the non-fatal path.

use thiserror::Error;

/// The error type for `termspec-core` operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem operation failed (reading manifest, terminology files, writing output).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A network request to a remote specification failed outright (not to be confused
    /// with a per-term miss, which is recorded as a non-fatal finding).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The project manifest file does not exist at the expected path.
    #[error("manifest not found at {0}")]
    ManifestMissing(String),

    /// The project manifest exists but failed to parse, or is missing required fields.
    #[error("manifest invalid: {0}")]
    ManifestInvalid(String),

    /// The configured output directory could not be created or written to.
    #[error("output path unwritable: {0}")]
    OutputPathUnwritable(String),

    /// A `[[...]]` tag could not be parsed.
    #[error("malformed tag: {0}")]
    TagMalformed(String),

    /// Reading or writing the persistent reference store failed.
    #[error("reference store error: {0}")]
    Store(String),

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The Markdown rendering pipeline failed in a way that cannot be recovered from.
    #[error("render error: {0}")]
    Render(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Whether a caller could plausibly retry the operation that produced
    /// this error and expect a different outcome. Network timeouts and
    /// connection failures are recoverable; a missing or malformed manifest
    /// is not -- retrying without fixing the underlying file changes nothing.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Returns a short, stable category label, useful for grouping in logs.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network(_) => "network",
            Self::ManifestMissing(_) => "manifest_missing",
            Self::ManifestInvalid(_) => "manifest_invalid",
            Self::OutputPathUnwritable(_) => "output_path_unwritable",
            Self::TagMalformed(_) => "tag_malformed",
            Self::Store(_) => "store",
            Self::Serialization(_) => "serialization",
            Self::Render(_) => "render",
        }
    }
}

/// Convenience alias used throughout `termspec-core`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_is_stable_per_variant() {
        assert_eq!(Error::ManifestMissing("x".into()).category(), "manifest_missing");
        assert_eq!(Error::TagMalformed("x".into()).category(), "tag_malformed");
        assert_eq!(Error::Store("x".into()).category(), "store");
    }

    #[test]
    fn display_includes_message() {
        let err = Error::ManifestInvalid("specs array is empty".to_string());
        assert!(err.to_string().contains("specs array is empty"));
    }

    #[test]
    fn manifest_errors_are_not_recoverable() {
        assert!(!Error::ManifestMissing("x".into()).is_recoverable());
        assert!(!Error::ManifestInvalid("x".into()).is_recoverable());
    }

    #[test]
    fn timed_out_io_error_is_recoverable() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk");
        assert!(Error::Io(io).is_recoverable());
    }
}
