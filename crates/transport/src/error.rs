use std::io;

/// Errors framing or unframing DAP messages
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("header is not valid UTF-8")]
    InvalidUtf8,

    #[error("malformed Content-Length header value")]
    MalformedContentLength,

    #[error("missing Content-Length header")]
    MissingContentLength,

    /// No header terminator within the allowed header size.
    #[error("header exceeds {max} bytes")]
    HeaderTooLarge { max: usize },

    #[error("message size {size} exceeds maximum allowed {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("invalid message body: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("could not serialize message: {0}")]
    Serialize(#[source] serde_json::Error),
}
