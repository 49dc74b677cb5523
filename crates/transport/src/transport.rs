use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

use crate::{MessageReader, MessageWriter};

/// A byte stream that can be split into independently owned halves.
pub trait Connection: Send + 'static {
    type Read: AsyncRead + Unpin + Send + 'static;
    type Write: AsyncWrite + Unpin + Send + 'static;

    fn into_split(self) -> (Self::Read, Self::Write);
}

impl Connection for TcpStream {
    type Read = OwnedReadHalf;
    type Write = OwnedWriteHalf;

    fn into_split(self) -> (Self::Read, Self::Write) {
        TcpStream::into_split(self)
    }
}

/// Split a connection into a message reader and writer.
pub fn split<C: Connection>(connection: C) -> (MessageReader<C::Read>, MessageWriter<C::Write>) {
    let (read, write) = connection.into_split();
    (MessageReader::new(read), MessageWriter::new(write))
}
