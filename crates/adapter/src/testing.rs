//! Test helpers for driving a bridged session.
//!
//! [`start_session`] runs [`run_session`] over in-memory transports with a
//! [`TestClient`] standing in for the IDE and a [`MockBackend`] for the debug
//! server. Both ends keep messages they were not asked for, so a test can
//! wait for a response while unrelated events arrive in between.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicI64, Ordering},
    time::Duration,
};

use eyre::WrapErr;
use futures::StreamExt;
use serde_json::Value;
use session::SourceReference;
use tokio::{io::DuplexStream, sync::Mutex, task::JoinHandle, time::Instant};
use transport::{
    Event, Message, MessageReader, MessageWriter, Request, Response, Seq, split,
    testing::MemoryTransport,
};

use crate::{SessionOptions, run_session};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// One end of a DAP conversation
struct Peer {
    reader: Mutex<MessageReader<DuplexStream>>,
    writer: Mutex<MessageWriter<DuplexStream>>,
    unclaimed: Mutex<VecDeque<Message>>,
    sequence: AtomicI64,
    timeout: Duration,
}

impl Peer {
    fn new(connection: MemoryTransport) -> Self {
        let (reader, writer) = split(connection);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            unclaimed: Mutex::new(VecDeque::new()),
            sequence: AtomicI64::new(1),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    async fn send(&self, message: impl Into<Message>) -> eyre::Result<Seq> {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.writer
            .lock()
            .await
            .send(message.into().with_seq(seq))
            .await
            .wrap_err("sending message")?;
        Ok(seq)
    }

    /// Wait for the first message matching `pick`; others are kept for later.
    async fn expect(&self, what: &str, mut pick: impl FnMut(&Message) -> bool) -> eyre::Result<Message> {
        {
            let mut unclaimed = self.unclaimed.lock().await;
            let found = unclaimed.iter().position(&mut pick);
            if let Some(message) = found.and_then(|i| unclaimed.remove(i)) {
                return Ok(message);
            }
        }

        let deadline = Instant::now() + self.timeout;
        let mut reader = self.reader.lock().await;
        loop {
            let message = match tokio::time::timeout_at(deadline, reader.next()).await {
                Err(_) => eyre::bail!("timed out waiting for {what}"),
                Ok(None) => eyre::bail!("connection closed while waiting for {what}"),
                Ok(Some(message)) => message.wrap_err("decoding message")?,
            };
            if pick(&message) {
                return Ok(message);
            }
            tracing::debug!(message = %message.describe(), %what, "keeping message for later");
            self.unclaimed.lock().await.push_back(message);
        }
    }

    async fn expect_request(&self, command: &str) -> eyre::Result<Request> {
        match self
            .expect(&format!("{command} request"), |m| {
                matches!(m, Message::Request(r) if r.command == command)
            })
            .await?
        {
            Message::Request(request) => Ok(request),
            other => eyre::bail!("expected request, got {}", other.describe()),
        }
    }

    async fn expect_response(&self, request_seq: Seq) -> eyre::Result<Response> {
        match self
            .expect(&format!("response to {request_seq}"), |m| {
                matches!(m, Message::Response(r) if r.request_seq == request_seq)
            })
            .await?
        {
            Message::Response(response) => Ok(response),
            other => eyre::bail!("expected response, got {}", other.describe()),
        }
    }

    async fn expect_event(&self, name: &str) -> eyre::Result<Event> {
        match self
            .expect(&format!("{name} event"), |m| {
                matches!(m, Message::Event(e) if e.event == name)
            })
            .await?
        {
            Message::Event(event) => Ok(event),
            other => eyre::bail!("expected event, got {}", other.describe()),
        }
    }

    /// Wait for the other side to close the connection.
    async fn closed(&self) -> eyre::Result<()> {
        let deadline = Instant::now() + self.timeout;
        let mut reader = self.reader.lock().await;
        loop {
            match tokio::time::timeout_at(deadline, reader.next()).await {
                Err(_) => eyre::bail!("connection still open"),
                Ok(None) => return Ok(()),
                Ok(Some(message)) => {
                    if let Ok(message) = message {
                        self.unclaimed.lock().await.push_back(message);
                    }
                }
            }
        }
    }
}

/// Scripted stand-in for the debug server next to the debuggee
pub struct MockBackend {
    peer: Peer,
}

impl MockBackend {
    pub fn new(connection: MemoryTransport) -> Self {
        Self {
            peer: Peer::new(connection),
        }
    }

    /// Wait for a request with `command`, keeping any other message.
    pub async fn expect_request(&self, command: &str) -> eyre::Result<Request> {
        self.peer.expect_request(command).await
    }

    pub async fn respond(&self, request: &Request, body: Option<Value>) -> eyre::Result<()> {
        self.peer.send(Response::success(request, body)).await?;
        Ok(())
    }

    pub async fn respond_error(&self, request: &Request, message: &str) -> eyre::Result<()> {
        self.peer.send(Response::error(request, message)).await?;
        Ok(())
    }

    pub async fn send_event(&self, event: &str, body: Option<Value>) -> eyre::Result<()> {
        self.peer.send(Event::new(event, body)).await?;
        Ok(())
    }

    /// Send a reverse request to the client, e.g. `runInTerminal`.
    pub async fn send_request(&self, command: &str, arguments: Option<Value>) -> eyre::Result<Seq> {
        self.peer.send(Request::new(command, arguments)).await
    }

    pub async fn expect_response(&self, request_seq: Seq) -> eyre::Result<Response> {
        self.peer.expect_response(request_seq).await
    }

    /// Answer the `initialize` / `attach` handshake the way debugpy does.
    ///
    /// Returns the arguments the backend received with `attach` or `launch`.
    pub async fn accept_handshake(&self, command: &str) -> eyre::Result<Value> {
        let initialize = self.expect_request("initialize").await?;
        self.respond(
            &initialize,
            Some(serde_json::json!({"supportsConfigurationDoneRequest": true})),
        )
        .await?;
        let attach = self.expect_request(command).await?;
        self.send_event("initialized", None).await?;
        self.respond(&attach, None).await?;
        Ok(attach.arguments.unwrap_or_default())
    }
}

/// Stand-in for the IDE
pub struct TestClient {
    peer: Peer,
}

impl TestClient {
    pub fn new(connection: MemoryTransport) -> Self {
        Self {
            peer: Peer::new(connection),
        }
    }

    /// Send a request without waiting for its response.
    pub async fn request(&self, command: &str, arguments: Option<Value>) -> eyre::Result<Seq> {
        self.peer.send(Request::new(command, arguments)).await
    }

    pub async fn expect_response(&self, request_seq: Seq) -> eyre::Result<Response> {
        self.peer.expect_response(request_seq).await
    }

    /// Send a request and wait for its response.
    pub async fn call(&self, command: &str, arguments: Option<Value>) -> eyre::Result<Response> {
        let seq = self.request(command, arguments).await?;
        self.expect_response(seq).await
    }

    pub async fn expect_event(&self, name: &str) -> eyre::Result<Event> {
        self.peer.expect_event(name).await
    }

    pub async fn expect_request(&self, command: &str) -> eyre::Result<Request> {
        self.peer.expect_request(command).await
    }

    pub async fn respond(&self, request: &Request, body: Option<Value>) -> eyre::Result<()> {
        self.peer.send(Response::success(request, body)).await?;
        Ok(())
    }

    /// Wait for the adapter to close the connection.
    pub async fn closed(&self) -> eyre::Result<()> {
        self.peer.closed().await
    }
}

/// Handle to a session started by [`start_session`]
pub struct SessionHandle {
    handle: JoinHandle<eyre::Result<SourceReference>>,
}

impl SessionHandle {
    /// Wait for the session to end and return its high-water mark.
    pub async fn finished(self) -> eyre::Result<SourceReference> {
        tokio::time::timeout(DEFAULT_TIMEOUT, self.handle)
            .await
            .wrap_err("session did not end")?
            .wrap_err("session task panicked")?
    }
}

/// Start a session whose source references lie above `floor`.
pub fn start_session(
    options: SessionOptions,
    floor: SourceReference,
) -> (TestClient, MockBackend, SessionHandle) {
    let (client, frontend) = MemoryTransport::pair();
    let (backend_side, backend) = MemoryTransport::pair();
    let handle =
        tokio::spawn(async move { run_session(frontend, backend_side, &options, floor).await });
    (
        TestClient::new(client),
        MockBackend::new(backend),
        SessionHandle { handle },
    )
}
