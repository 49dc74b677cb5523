use tokio::io::{DuplexStream, duplex};

use crate::Connection;

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// One end of an in-memory connection.
///
/// Bytes written to one end of a [`MemoryTransport::pair`] are read from the
/// other.
#[derive(Debug)]
pub struct MemoryTransport {
    read: DuplexStream,
    write: DuplexStream,
}

impl MemoryTransport {
    pub fn pair() -> (Self, Self) {
        Self::pair_with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn pair_with_buffer_size(buffer_size: usize) -> (Self, Self) {
        let (a_write, b_read) = duplex(buffer_size);
        let (b_write, a_read) = duplex(buffer_size);
        (
            MemoryTransport {
                read: a_read,
                write: a_write,
            },
            MemoryTransport {
                read: b_read,
                write: b_write,
            },
        )
    }
}

impl Connection for MemoryTransport {
    type Read = DuplexStream;
    type Write = DuplexStream;

    fn into_split(self) -> (Self::Read, Self::Write) {
        (self.read, self.write)
    }
}
