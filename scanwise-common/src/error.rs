//! Common error types for Scanwise
//!
//! The scan pipeline distinguishes two blocking failures (`NotFound`,
//! `NetworkUnavailable`) from everything else, which degrades a single
//! section of the report instead of failing the whole scan.

use thiserror::Error;

/// Common result type for Scanwise operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Scanwise services
#[derive(Error, Debug)]
pub enum Error {
    /// Product could not be identified (terminal for a scan run)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Connectivity problem (terminal, gets distinct user messaging)
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// A single enrichment stage failed (non-terminal, section degrades)
    #[error("{stage} stage failed: {message}")]
    Stage { stage: &'static str, message: String },

    /// Scan history write failed (logged and swallowed by the caller)
    #[error("Persistence failed: {0}")]
    Persistence(String),

    /// Image upload failed (caller falls back to the local reference)
    #[error("Upload failed: {0}")]
    Upload(String),

    /// HTTP transport or status error that is not a connectivity problem
    #[error("HTTP error: {0}")]
    Http(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Substrings that mark a transport failure as a connectivity problem.
///
/// Lower-case; matched case-insensitively against the error message. The
/// identify and recommendation calls run under a hard client-side timeout,
/// so "timed out" counts as connectivity too.
const CONNECTIVITY_KEYWORDS: &[&str] = &[
    "network",
    "connection",
    "connect",
    "dns",
    "offline",
    "unreachable",
    "timed out",
    "timeout",
];

impl Error {
    /// Classify a transport-level failure message.
    ///
    /// Returns `NetworkUnavailable` when the message contains a connectivity
    /// keyword, `Http` otherwise. Clients use this when mapping reqwest
    /// errors so the UI can offer a "check your connection" affordance
    /// instead of a generic retry.
    pub fn from_transport(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        if CONNECTIVITY_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            Error::NetworkUnavailable(message)
        } else {
            Error::Http(message)
        }
    }

    /// True for connectivity failures
    pub fn is_network_unavailable(&self) -> bool {
        matches!(self, Error::NetworkUnavailable(_))
    }

    /// True for failures that abort the whole scan run
    ///
    /// Everything else degrades the affected section only.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::NetworkUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_keywords_classified_as_network_unavailable() {
        let cases = [
            "Network request failed",
            "error sending request: Connection refused",
            "dns error: failed to lookup address",
            "operation timed out",
            "client is offline",
        ];
        for msg in cases {
            let err = Error::from_transport(msg);
            assert!(
                err.is_network_unavailable(),
                "expected NetworkUnavailable for {:?}, got {:?}",
                msg,
                err
            );
        }
    }

    #[test]
    fn test_non_connectivity_messages_stay_http() {
        let err = Error::from_transport("server returned status 500");
        assert!(matches!(err, Error::Http(_)));
        assert!(!err.is_terminal());
    }

    #[test]
    fn test_terminal_classification() {
        assert!(Error::NotFound("no product".into()).is_terminal());
        assert!(Error::NetworkUnavailable("offline".into()).is_terminal());
        assert!(!Error::Stage {
            stage: "ingredients",
            message: "bad response".into()
        }
        .is_terminal());
        assert!(!Error::Persistence("backend down".into()).is_terminal());
    }
}
