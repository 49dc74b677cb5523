//! `Content-Length` framing of DAP messages.
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <JSON body>
//! ```

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{CodecError, Message};

const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
const MAX_HEADER_SIZE: usize = 8 * 1024;
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Encoder and decoder for framed DAP messages
#[derive(Debug, Clone)]
pub struct ContentLengthCodec {
    max_message_size: usize,
}

impl ContentLengthCodec {
    pub fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Reject bodies longer than `max_message_size` bytes.
    pub fn with_max_size(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Default for ContentLengthCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ContentLengthCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(header_end) = find_header_end(src) else {
            if src.len() > MAX_HEADER_SIZE {
                return Err(CodecError::HeaderTooLarge {
                    max: MAX_HEADER_SIZE,
                });
            }
            return Ok(None);
        };

        let content_length = parse_content_length(&src[..header_end])?;
        if content_length > self.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: content_length,
                max: self.max_message_size,
            });
        }

        let body_start = header_end + HEADER_TERMINATOR.len();
        let frame_end = body_start + content_length;
        if src.len() < frame_end {
            src.reserve(frame_end - src.len());
            return Ok(None);
        }

        let parsed = serde_json::from_slice(&src[body_start..frame_end]);
        // drop the frame even when the body is bad so the stream can resync
        src.advance(frame_end);
        parsed.map(Some).map_err(CodecError::Deserialize)
    }
}

impl Encoder<Message> for ContentLengthCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&item).map_err(CodecError::Serialize)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        dst.reserve(header.len() + body.len());
        dst.put_slice(header.as_bytes());
        dst.put_slice(&body);
        Ok(())
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}

/// Header names are case-insensitive; headers other than `Content-Length`
/// are ignored.
fn parse_content_length(header: &[u8]) -> Result<usize, CodecError> {
    let header = std::str::from_utf8(header).map_err(|_| CodecError::InvalidUtf8)?;
    header
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .ok_or(CodecError::MissingContentLength)
        .and_then(|(_, value)| {
            value
                .trim()
                .parse()
                .map_err(|_| CodecError::MalformedContentLength)
        })
}
