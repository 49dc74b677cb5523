//! Error types for path translation.

/// Reasons a path could not be translated.
///
/// None of these are fatal: callers fall back to treating the path as valid
/// in the target namespace, or to serving the file by reference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// No configured rule covers the path.
    #[error("no path mapping matches {path}")]
    UnmappedPath {
        /// The path as supplied.
        path: String,
    },

    /// A rule matched but the translated path does not exist locally.
    #[error("{remote} maps to {candidate}, which is not a local file")]
    LocalMiss {
        /// The remote path as supplied.
        remote: String,
        /// The local path the matching rule produced.
        candidate: String,
    },

    /// An operating system name that is not one of the known families.
    #[error("unrecognized operating system {0:?}")]
    UnrecognizedOs(String),
}
