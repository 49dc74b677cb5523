//! Connection to the debug server running next to the debuggee.

use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use eyre::WrapErr;
use paths::OsFamily;
use serde_json::{Value, json};
use session::{ConfigurationSink, DebuggeeConnection, VerifiedBreakpoint};
use tokio::{io::AsyncWrite, sync::oneshot};
use tokio_util::sync::CancellationToken;
use transport::{Message, MessageWriter, Request, Response, Seq};

/// How long a forwarded request may wait for the backend by default
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type BoxedWrite = Box<dyn AsyncWrite + Unpin + Send>;

/// Response the backend has not sent yet
pub(crate) type PendingResponse = oneshot::Receiver<Response>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Writer half of the backend connection plus request bookkeeping.
///
/// Requests are written in call order. Their responses are routed back by
/// [`Backend::handle_response`], which the backend reader task calls.
pub struct Backend {
    writer: tokio::sync::Mutex<MessageWriter<BoxedWrite>>,
    sequence_number: AtomicI64,
    pending_requests: Mutex<HashMap<Seq, oneshot::Sender<Response>>>,
    /// The backend's own `sourceReference` for paths it reported
    source_references: Mutex<HashMap<String, i64>>,
    client_os: Mutex<Option<OsFamily>>,
    timeout: Duration,
    cancellation: CancellationToken,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("sequence_number", &self.sequence_number)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Backend {
    pub(crate) fn new(
        writer: impl AsyncWrite + Unpin + Send + 'static,
        timeout: Duration,
        cancellation: CancellationToken,
    ) -> Self {
        let writer: BoxedWrite = Box::new(writer);
        Self {
            writer: tokio::sync::Mutex::new(MessageWriter::new(writer)),
            sequence_number: AtomicI64::new(1),
            pending_requests: Mutex::new(HashMap::new()),
            source_references: Mutex::new(HashMap::new()),
            client_os: Mutex::new(None),
            timeout,
            cancellation,
        }
    }

    /// Write a message with the next backend sequence number.
    pub(crate) async fn send_message(&self, message: Message) -> eyre::Result<Seq> {
        let mut writer = self.writer.lock().await;
        let seq = self.sequence_number.fetch_add(1, Ordering::SeqCst);
        writer
            .send(message.with_seq(seq))
            .await
            .wrap_err("writing to backend")?;
        Ok(seq)
    }

    /// Send a request and return a handle to its response.
    ///
    /// Resolves once the request is written, not when it is answered.
    pub(crate) async fn send_request(
        &self,
        command: &str,
        arguments: Option<Value>,
    ) -> eyre::Result<PendingResponse> {
        let mut writer = self.writer.lock().await;
        let seq = self.sequence_number.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        lock(&self.pending_requests).insert(seq, tx);

        let request = Request {
            seq,
            command: command.to_string(),
            arguments,
        };
        if let Err(e) = writer.send(request).await {
            lock(&self.pending_requests).remove(&seq);
            return Err(e).wrap_err_with(|| format!("sending {command} request"));
        }
        tracing::debug!(%seq, %command, "sent request to backend");
        Ok(rx)
    }

    /// Wait for a response, giving up on timeout or when the session ends.
    pub(crate) async fn wait(&self, pending: PendingResponse) -> eyre::Result<Response> {
        tokio::select! {
            _ = self.cancellation.cancelled() => eyre::bail!("session ended"),
            response = tokio::time::timeout(self.timeout, pending) => response
                .wrap_err("timeout waiting for response")?
                .wrap_err("response channel closed"),
        }
    }

    /// Send a request and wait for its response.
    pub(crate) async fn call(&self, command: &str, arguments: Option<Value>) -> eyre::Result<Response> {
        let pending = self.send_request(command, arguments).await?;
        self.wait(pending).await
    }

    /// Route a response from the backend to whoever is waiting for it.
    pub(crate) fn handle_response(&self, response: Response) {
        match lock(&self.pending_requests).remove(&response.request_seq) {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => tracing::warn!(request_seq = response.request_seq, "response to unknown request"),
        }
    }

    /// Drop every outstanding request; their waiters fail immediately.
    pub(crate) fn fail_pending(&self) {
        let pending = std::mem::take(&mut *lock(&self.pending_requests));
        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "abandoning backend requests");
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        lock(&self.pending_requests).len()
    }

    /// Remember the reference the backend uses for `path`.
    pub(crate) fn remember_source(&self, path: &str, reference: i64) {
        if reference > 0 {
            lock(&self.source_references).insert(path.to_string(), reference);
        }
    }

    pub(crate) fn source_reference(&self, path: &str) -> i64 {
        lock(&self.source_references)
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    /// Value of the `clientOS` launch argument the backend expects.
    pub(crate) fn client_os_argument(&self) -> Option<&'static str> {
        lock(&self.client_os).map(|os| if os.is_windows() { "windows" } else { "unix" })
    }
}

/// Parse the `breakpoints` of a `setBreakpoints` response.
///
/// Missing lines fall back to the requested ones, in order.
pub(crate) fn verified_breakpoints(
    response: Response,
    requested: &[i64],
) -> eyre::Result<Vec<VerifiedBreakpoint>> {
    if !response.success {
        eyre::bail!(
            "setBreakpoints failed: {}",
            response.message.unwrap_or_default()
        );
    }
    let body = response.body.unwrap_or_default();
    let Some(breakpoints) = body.get("breakpoints").and_then(Value::as_array) else {
        eyre::bail!("setBreakpoints response has no breakpoints");
    };

    Ok(breakpoints
        .iter()
        .enumerate()
        .map(|(i, bp)| VerifiedBreakpoint {
            id: bp.get("id").and_then(Value::as_i64),
            line: bp
                .get("line")
                .and_then(Value::as_i64)
                .or_else(|| requested.get(i).copied())
                .unwrap_or_default(),
            verified: bp.get("verified").and_then(Value::as_bool).unwrap_or(false),
            path: bp
                .pointer("/source/path")
                .and_then(Value::as_str)
                .map(str::to_string),
            message: bp
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
        .collect())
}

#[async_trait]
impl DebuggeeConnection for Backend {
    async fn read_file(&self, remote_path: &str) -> eyre::Result<String> {
        let reference = self.source_reference(remote_path);
        let arguments = json!({
            "source": { "path": remote_path, "sourceReference": reference },
            "sourceReference": reference,
        });
        let response = self.call("source", Some(arguments)).await?;
        if !response.success {
            eyre::bail!(
                "backend could not read {remote_path}: {}",
                response.message.unwrap_or_default()
            );
        }
        response
            .body
            .as_ref()
            .and_then(|b| b.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| eyre::eyre!("source response for {remote_path} has no content"))
    }
}

impl ConfigurationSink for Backend {
    fn set_client_os(&self, os: OsFamily) {
        tracing::debug!(%os, "client OS for backend");
        *lock(&self.client_os) = Some(os);
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tokio::io::DuplexStream;
    use transport::{Connection, MessageReader, testing::MemoryTransport};

    use super::*;

    fn backend_with(
        timeout: Duration,
        cancellation: CancellationToken,
    ) -> (Backend, MessageReader<DuplexStream>) {
        let (ours, theirs) = MemoryTransport::pair();
        let (_, write) = ours.into_split();
        let (their_rx, _) = transport::split(theirs);
        (Backend::new(write, timeout, cancellation), their_rx)
    }

    fn backend() -> (Backend, MessageReader<DuplexStream>) {
        backend_with(Duration::from_secs(5), CancellationToken::new())
    }

    #[tokio::test]
    async fn responses_reach_their_waiter() {
        let (backend, mut wire) = backend();

        let first = backend.send_request("threads", None).await.unwrap();
        let second = backend.send_request("modules", None).await.unwrap();
        let Some(Ok(Message::Request(r1))) = wire.next().await else {
            panic!("expected first request");
        };
        let Some(Ok(Message::Request(r2))) = wire.next().await else {
            panic!("expected second request");
        };
        assert!(r2.seq > r1.seq);

        backend.handle_response(Response::success(&r2, None));
        backend.handle_response(Response::success(&r1, None));
        assert_eq!(backend.wait(first).await.unwrap().command, "threads");
        assert_eq!(backend.wait(second).await.unwrap().command, "modules");
        assert_eq!(backend.pending_count(), 0);
    }

    #[tokio::test]
    async fn cancellation_ends_wait() {
        let cancellation = CancellationToken::new();
        let (backend, _wire) = backend_with(Duration::from_secs(60), cancellation.clone());

        let pending = backend.send_request("threads", None).await.unwrap();
        cancellation.cancel();
        assert!(backend.wait(pending).await.is_err());
    }

    #[tokio::test]
    async fn failing_pending_requests_releases_waiters() {
        let (backend, _wire) = backend();
        let pending = backend.send_request("threads", None).await.unwrap();
        backend.fail_pending();
        assert!(backend.wait(pending).await.is_err());
    }

    #[test]
    fn parses_breakpoint_responses() {
        let request = Request::new("setBreakpoints", None);
        let response = Response::success(
            &request,
            Some(json!({"breakpoints": [
                {"id": 1, "verified": true, "line": 5},
                {"verified": false, "message": "no code", "source": {"path": "/app/x.py"}},
            ]})),
        );
        let parsed = verified_breakpoints(response, &[4, 9]).unwrap();
        assert_eq!(parsed[0].id, Some(1));
        assert_eq!(parsed[0].line, 5);
        assert!(parsed[0].verified);
        assert_eq!(parsed[1].id, None);
        assert_eq!(parsed[1].line, 9);
        assert_eq!(parsed[1].path.as_deref(), Some("/app/x.py"));
        assert_eq!(parsed[1].message.as_deref(), Some("no code"));

        let failed = Response::error(&request, "not attached");
        assert!(verified_breakpoints(failed, &[1]).is_err());
    }

    #[test]
    fn client_os_argument() {
        let (backend, _wire) = backend_with(DEFAULT_REQUEST_TIMEOUT, CancellationToken::new());
        assert_eq!(backend.client_os_argument(), None);
        backend.set_client_os(OsFamily::Windows);
        assert_eq!(backend.client_os_argument(), Some("windows"));
        backend.set_client_os(OsFamily::Mac);
        assert_eq!(backend.client_os_argument(), Some("unix"));
    }
}
