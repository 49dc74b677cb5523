use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use pin_project_lite::pin_project;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::{CodecError, ContentLengthCodec, Message};

pin_project! {
    /// Stream of messages decoded from an [`AsyncRead`].
    ///
    /// Ends when the peer closes its side of the connection.
    pub struct MessageReader<R> {
        #[pin]
        inner: FramedRead<R, ContentLengthCodec>,
    }
}

impl<R> MessageReader<R>
where
    R: AsyncRead,
{
    pub fn new(reader: R) -> Self {
        Self::with_codec(reader, ContentLengthCodec::new())
    }

    pub fn with_codec(reader: R, codec: ContentLengthCodec) -> Self {
        Self {
            inner: FramedRead::new(reader, codec),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

impl<R> Stream for MessageReader<R>
where
    R: AsyncRead,
{
    type Item = Result<Message, CodecError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}
