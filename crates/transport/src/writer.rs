use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::{Sink, SinkExt};
use pin_project_lite::pin_project;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;

use crate::{CodecError, ContentLengthCodec, Message};

pin_project! {
    /// Sink that frames messages onto an [`AsyncWrite`].
    pub struct MessageWriter<W> {
        #[pin]
        inner: FramedWrite<W, ContentLengthCodec>,
    }
}

impl<W> MessageWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self {
            inner: FramedWrite::new(writer, ContentLengthCodec::new()),
        }
    }

    /// Write one message and flush it.
    pub async fn send(&mut self, message: impl Into<Message>) -> Result<(), CodecError> {
        let message = message.into();
        tracing::trace!(message = %message.describe(), "writing message");
        SinkExt::send(&mut self.inner, message).await
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

impl<W> Sink<Message> for MessageWriter<W>
where
    W: AsyncWrite,
{
    type Error = CodecError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        self.project().inner.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_close(cx)
    }
}
