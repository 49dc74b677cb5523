//! Helpers for tests that speak DAP.

mod memory;

pub use memory::MemoryTransport;

use serde::Serialize;

/// Frame a JSON-serializable message the way it appears on the wire.
///
/// ```
/// use serde_json::json;
/// use transport::testing::frame_message;
///
/// let bytes = frame_message(&json!({"seq": 1, "type": "event", "event": "initialized"})).unwrap();
/// assert!(bytes.starts_with(b"Content-Length: "));
/// ```
pub fn frame_message(message: &impl Serialize) -> serde_json::Result<Vec<u8>> {
    let json = serde_json::to_string(message)?;
    Ok(format!("Content-Length: {}\r\n\r\n{json}", json.len()).into_bytes())
}

/// Frame several messages back to back.
pub fn frame_messages<T: Serialize>(messages: &[T]) -> serde_json::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for message in messages {
        bytes.extend(frame_message(message)?);
    }
    Ok(bytes)
}
