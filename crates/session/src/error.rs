use std::time::Duration;

/// Message the `source` request fails with whenever content cannot be served
/// for a reference.
pub const SOURCE_UNAVAILABLE: &str = "Source unavailable";

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures resolving or fetching source content by reference
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Reference 0, or a reference this session never issued.
    #[error("Source unavailable")]
    SourceUnavailable { reference: i64 },

    /// A reference issued by an earlier session.
    #[error("Source unavailable")]
    StaleHandle { reference: i64 },

    /// The session ended while the fetch was outstanding.
    #[error("Source unavailable")]
    Cancelled { path: String },

    #[error("timed out after {after:?} fetching {path}")]
    TimedOut { path: String, after: Duration },

    #[error("fetching {path}")]
    Fetch {
        path: String,
        #[source]
        source: BoxError,
    },
}

impl SourceError {
    /// Whether this is reported to the client as plain "Source unavailable"
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            SourceError::SourceUnavailable { .. }
                | SourceError::StaleHandle { .. }
                | SourceError::Cancelled { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session is already configured")]
    AlreadyConfigured,

    #[error("session has ended")]
    Ended,
}
