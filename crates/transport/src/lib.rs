//! Async framing for the Debug Adapter Protocol.
//!
//! - [`ContentLengthCodec`] frames [`Message`]s with a `Content-Length` header
//! - [`MessageReader`] turns an `AsyncRead` into a `Stream` of messages
//! - [`MessageWriter`] is a `Sink` of messages over an `AsyncWrite`
//!
//! Correlating requests with responses, and deciding what to do with a
//! message, is left to the caller.

mod codec;
mod error;
mod message;
mod reader;
mod transport;
mod writer;

pub mod testing;

pub use codec::ContentLengthCodec;
pub use error::CodecError;
pub use message::{Event, Message, Request, Response, Seq};
pub use reader::MessageReader;
pub use transport::{Connection, split};
pub use writer::MessageWriter;

use std::io;

use tokio::net::{TcpStream, ToSocketAddrs, tcp};

/// Connect to a DAP server over TCP.
pub async fn connect(
    addr: impl ToSocketAddrs,
) -> io::Result<(
    MessageReader<tcp::OwnedReadHalf>,
    MessageWriter<tcp::OwnedWriteHalf>,
)> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(split(stream))
}
