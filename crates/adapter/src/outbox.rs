use std::sync::{Arc, Mutex, PoisonError};

use tokio::{io::AsyncWrite, sync::mpsc};
use transport::{Message, MessageWriter, Seq};

#[derive(Debug)]
struct OutboxState {
    next_seq: Seq,
    tx: mpsc::UnboundedSender<Message>,
}

/// Queue of messages to the frontend.
///
/// Sequence numbers are assigned as messages are queued, so the frontend sees
/// them in increasing order whichever task produced them.
#[derive(Debug, Clone)]
pub(crate) struct Outbox {
    state: Arc<Mutex<OutboxState>>,
}

impl Outbox {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = OutboxState { next_seq: 1, tx };
        (
            Self {
                state: Arc::new(Mutex::new(state)),
            },
            rx,
        )
    }

    /// Queue a message, returning the sequence number it goes out with.
    pub(crate) fn send(&self, message: impl Into<Message>) -> Seq {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = state.next_seq;
        state.next_seq += 1;
        let message = message.into().with_seq(seq);
        if let Err(e) = state.tx.send(message) {
            tracing::debug!(message = %e.0.describe(), "frontend writer gone, dropping message");
        }
        seq
    }
}

/// Write queued messages until every [`Outbox`] is dropped.
pub(crate) async fn drain<W>(mut rx: mpsc::UnboundedReceiver<Message>, mut writer: MessageWriter<W>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        tracing::debug!(message = %message.describe(), "to frontend");
        if let Err(e) = writer.send(message).await {
            tracing::warn!(error = %e, "writing to frontend");
            break;
        }
    }
    tracing::debug!("frontend writer finished");
}
