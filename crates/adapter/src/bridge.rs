//! One client session, relayed between the frontend and the backend.
//!
//! The frontend reader runs in [`run_session`] and hands each request to
//! [`Bridge::dispatch`]. Dispatch writes to the backend in request order but
//! never waits for a backend response: waits run as tracked tasks that answer
//! the frontend through the [`Outbox`] once the backend replies.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};
use session::{
    BreakpointInstaller, DebuggeeConnection, InstalledBreakpoint, ProbeMode, SessionConfig,
    SessionContext, SourceReference, VerifiedBreakpoint,
};
use tokio::{io::AsyncRead, sync::oneshot};
use tokio_util::task::TaskTracker;
use tracing::Instrument;
use transport::{Connection, Event, Message, MessageReader, Request, Response, Seq};

use crate::{
    backend::{Backend, DEFAULT_REQUEST_TIMEOUT, PendingResponse, verified_breakpoints},
    outbox::{self, Outbox},
    sources::SourceRewriter,
};

/// How long queued frontend messages may take to flush once a session ends
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Settings shared by every session the server runs
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub probe: ProbeMode,
    pub fetch_timeout: Duration,
    /// Bound on every other request forwarded to the backend
    pub request_timeout: Duration,
    /// `launch` / `attach` arguments used when the client sends no `pathMappings`
    pub defaults: Option<Value>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            probe: ProbeMode::Auto,
            fetch_timeout: session::DEFAULT_FETCH_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            defaults: None,
        }
    }
}

/// What to do with a backend response before relaying it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum After {
    Relay,
    StackTrace,
    LoadedSources,
    Teardown,
}

struct Bridge {
    context: SessionContext,
    backend: Arc<Backend>,
    outbox: Outbox,
    options: SessionOptions,
    /// Frontend `seq` of a relayed reverse request to the backend's `seq`
    reverse_requests: Mutex<HashMap<Seq, Seq>>,
    terminated_sent: AtomicBool,
    tasks: TaskTracker,
}

/// Run one session to completion.
///
/// Source references handed out in this session lie above `floor`. Returns
/// the highest reference issued, the floor for the next session.
pub async fn run_session<F, B>(
    frontend: F,
    backend: B,
    options: &SessionOptions,
    floor: SourceReference,
) -> eyre::Result<SourceReference>
where
    F: Connection,
    B: Connection,
{
    let context = SessionContext::with_reference_floor(floor);
    let cancellation = context.cancellation().clone();

    let (mut frontend_rx, frontend_tx) = transport::split(frontend);
    let (backend_read, backend_write) = backend.into_split();
    let (outbox, queued) = Outbox::new();
    let writer = tokio::spawn(outbox::drain(queued, frontend_tx));

    let bridge = Arc::new(Bridge {
        context,
        backend: Arc::new(Backend::new(
            backend_write,
            options.request_timeout,
            cancellation.clone(),
        )),
        outbox,
        options: options.clone(),
        reverse_requests: Mutex::new(HashMap::new()),
        terminated_sent: AtomicBool::new(false),
        tasks: TaskTracker::new(),
    });

    let span = tracing::debug_span!("session", floor);
    bridge.tasks.spawn(
        Arc::clone(&bridge)
            .backend_messages(MessageReader::new(backend_read))
            .instrument(span.clone()),
    );

    async {
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    tracing::debug!("session cancelled");
                    break;
                }
                message = frontend_rx.next() => match message {
                    Some(Ok(Message::Request(request))) => bridge.dispatch(request).await,
                    Some(Ok(Message::Response(response))) => bridge.reverse_response(response).await,
                    Some(Ok(Message::Event(event))) => {
                        tracing::warn!(event = %event.event, "ignoring event from frontend");
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "reading from frontend");
                        break;
                    }
                    None => {
                        tracing::debug!("frontend disconnected");
                        break;
                    }
                }
            }
        }
    }
    .instrument(span)
    .await;

    let high_water = bridge.context.teardown();
    bridge.tasks.close();
    bridge.tasks.wait().await;
    bridge.backend.fail_pending();
    drop(bridge);

    match tokio::time::timeout(FLUSH_TIMEOUT, writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "frontend writer task failed"),
        Err(_) => tracing::warn!("timed out flushing messages to frontend"),
    }
    tracing::info!(high_water, "session ended");
    Ok(high_water)
}

impl Bridge {
    fn rewriter(&self) -> SourceRewriter<'_> {
        SourceRewriter::new(self.context.frames(), &self.backend)
    }

    #[tracing::instrument(skip_all, fields(seq = request.seq, command = %request.command))]
    async fn dispatch(self: &Arc<Self>, request: Request) {
        tracing::debug!("from frontend");
        let result = match request.command.as_str() {
            "launch" | "attach" => self.configure(&request).await,
            "setBreakpoints" => self.set_breakpoints(&request).await,
            "source" => {
                self.fetch_source(request.clone());
                Ok(())
            }
            "stackTrace" => self.forward(&request, After::StackTrace).await,
            "loadedSources" => self.forward(&request, After::LoadedSources).await,
            "disconnect" | "terminate" => self.forward(&request, After::Teardown).await,
            _ => self.forward(&request, After::Relay).await,
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "request failed");
            self.outbox.send(Response::error(&request, format!("{e:#}")));
        }
    }

    async fn forward(self: &Arc<Self>, request: &Request, after: After) -> eyre::Result<()> {
        self.forward_with(request, request.arguments.clone(), after)
            .await
    }

    async fn forward_with(
        self: &Arc<Self>,
        request: &Request,
        arguments: Option<Value>,
        after: After,
    ) -> eyre::Result<()> {
        let pending = self
            .backend
            .send_request(&request.command, arguments)
            .await?;
        self.tasks
            .spawn(Arc::clone(self).answer(request.clone(), pending, after).in_current_span());
        Ok(())
    }

    async fn answer(self: Arc<Self>, request: Request, pending: PendingResponse, after: After) {
        match self.backend.wait(pending).await {
            Ok(response) => self.relay(&request, response, after),
            Err(e) => {
                tracing::warn!(error = %e, "no response from backend");
                self.outbox
                    .send(Response::error(&request, format!("{e:#}")));
            }
        }
        if after == After::Teardown {
            self.context.teardown();
        }
    }

    fn relay(&self, request: &Request, mut response: Response, after: After) {
        if response.success {
            if let Some(body) = response.body.as_mut() {
                match after {
                    After::StackTrace => self.rewriter().stack_trace(body),
                    After::LoadedSources => self.rewriter().loaded_sources(body),
                    After::Relay | After::Teardown => {}
                }
            }
        }
        response.request_seq = request.seq;
        response.command = request.command.clone();
        self.outbox.send(response);
    }

    /// `launch` / `attach`: set up path mapping, then forward without it.
    async fn configure(self: &Arc<Self>, request: &Request) -> eyre::Result<()> {
        let mut arguments = request.arguments.clone().unwrap_or_else(|| json!({}));
        self.apply_defaults(&mut arguments);

        let config = SessionConfig::from_arguments(&arguments)?
            .with_fetch_timeout(self.options.fetch_timeout);
        self.context
            .configure(config, self.options.probe, self.backend.as_ref())?;

        // the backend must not map paths a second time
        if let Some(object) = arguments.as_object_mut() {
            object.remove("pathMappings");
            if let Some(os) = self.backend.client_os_argument() {
                object.insert("clientOS".to_string(), os.into());
            }
        }
        self.forward_with(request, Some(arguments), After::Relay)
            .await
    }

    fn apply_defaults(&self, arguments: &mut Value) {
        let Some(Value::Object(defaults)) = &self.options.defaults else {
            return;
        };
        let Some(object) = arguments.as_object_mut() else {
            return;
        };
        if object.contains_key("pathMappings") {
            return;
        }
        tracing::debug!("using path mappings from launch configuration");
        for (key, value) in defaults {
            object
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    async fn set_breakpoints(self: &Arc<Self>, request: &Request) -> eyre::Result<()> {
        let arguments = request.arguments.clone().unwrap_or_else(|| json!({}));
        let Some(client_path) = arguments
            .pointer("/source/path")
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            let arguments = self.resolve_breakpoint_source(arguments);
            return self.forward_with(request, Some(arguments), After::Relay).await;
        };
        let lines = requested_lines(&arguments);

        let (sent_tx, sent_rx) = oneshot::channel();
        let installer = ForwardedBreakpoints {
            backend: Arc::clone(&self.backend),
            arguments,
            sent: Mutex::new(Some(sent_tx)),
        };

        let bridge = Arc::clone(self);
        let request = request.clone();
        self.tasks.spawn(
            async move {
                let response = match bridge
                    .context
                    .breakpoints()
                    .install(&installer, &client_path, &lines)
                    .await
                {
                    Ok(installed) => {
                        let breakpoints: Vec<Value> = installed
                            .iter()
                            .map(|bp| bridge.breakpoint_body(bp))
                            .collect();
                        Response::success(&request, Some(json!({ "breakpoints": breakpoints })))
                    }
                    Err(e) => Response::error(&request, format!("{e:#}")),
                };
                bridge.outbox.send(response);
            }
            .in_current_span(),
        );

        // the next request must not overtake this one on the way to the backend
        let _ = sent_rx.await;
        Ok(())
    }

    /// Swap our own `sourceReference` for the debuggee path it stands for.
    ///
    /// The backend would read the reference as one of its own, so it never
    /// leaves the adapter.
    fn resolve_breakpoint_source(&self, mut arguments: Value) -> Value {
        let Some(source) = arguments.get_mut("source").and_then(Value::as_object_mut) else {
            return arguments;
        };
        let Some(reference) = source.remove("sourceReference").and_then(|r| r.as_i64()) else {
            return arguments;
        };
        match self.context.registry().resolve(reference) {
            Ok(remote_path) => {
                tracing::debug!(reference, %remote_path, "breakpoints by source reference");
                source.insert("path".to_string(), remote_path.into());
            }
            Err(e) => tracing::debug!(error = %e, reference, "dropping unknown source reference"),
        }
        arguments
    }

    fn breakpoint_body(&self, bp: &InstalledBreakpoint) -> Value {
        let mut source = json!({ "path": bp.path });
        if bp.unmapped {
            source["sourceReference"] = self.context.registry().allocate(&bp.path).into();
        }
        let mut body = json!({
            "verified": bp.verified,
            "line": bp.line,
            "source": source,
        });
        if let Some(id) = bp.id {
            body["id"] = id.into();
        }
        if let Some(message) = &bp.message {
            body["message"] = message.clone().into();
        }
        body
    }

    fn fetch_source(self: &Arc<Self>, request: Request) {
        let reference = request
            .arguments
            .as_ref()
            .and_then(|a| a.pointer("/source/sourceReference"))
            .and_then(Value::as_i64)
            .filter(|r| *r != 0)
            .or_else(|| request.argument("sourceReference").and_then(Value::as_i64))
            .unwrap_or(0);
        let connection: Arc<dyn DebuggeeConnection> = self.backend.clone();
        let service = self.context.content(connection);

        let bridge = Arc::clone(self);
        self.tasks.spawn(
            async move {
                let response = match service.fetch(reference).await {
                    Ok(content) => Response::success(&request, Some(json!({ "content": content }))),
                    Err(e) => {
                        tracing::debug!(error = %e, reference, "source not served");
                        Response::error(&request, format!("{:#}", eyre::Report::new(e)))
                    }
                };
                bridge.outbox.send(response);
            }
            .in_current_span(),
        );
    }

    async fn backend_messages<R>(self: Arc<Self>, mut reader: MessageReader<R>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let cancellation = self.context.cancellation().clone();
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    tracing::debug!("backend reader cancelled");
                    break;
                }
                message = reader.next() => match message {
                    Some(Ok(Message::Response(response))) => self.backend.handle_response(response),
                    Some(Ok(Message::Event(event))) => self.relay_event(event),
                    Some(Ok(Message::Request(request))) => self.relay_reverse_request(request),
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "reading from backend");
                        self.backend_gone();
                        break;
                    }
                    None => {
                        tracing::info!("backend disconnected");
                        self.backend_gone();
                        break;
                    }
                }
            }
        }
    }

    fn relay_event(&self, mut event: Event) {
        tracing::debug!(event = %event.event, "from backend");
        self.rewriter().event(&mut event);
        let terminated = event.event == "terminated";
        if terminated {
            self.terminated_sent.store(true, Ordering::SeqCst);
        }
        self.outbox.send(event);
        if terminated {
            self.context.teardown();
        }
    }

    fn backend_gone(&self) {
        if !self.terminated_sent.swap(true, Ordering::SeqCst) {
            self.outbox.send(Event::new("terminated", None));
        }
        self.context.teardown();
    }

    fn relay_reverse_request(&self, request: Request) {
        tracing::debug!(command = %request.command, "reverse request from backend");
        let backend_seq = request.seq;
        let mut reverse_requests = lock(&self.reverse_requests);
        let seq = self.outbox.send(request);
        reverse_requests.insert(seq, backend_seq);
    }

    async fn reverse_response(&self, mut response: Response) {
        let Some(backend_seq) = lock(&self.reverse_requests).remove(&response.request_seq) else {
            tracing::warn!(request_seq = response.request_seq, "response to unknown reverse request");
            return;
        };
        response.request_seq = backend_seq;
        if let Err(e) = self.backend.send_message(response.into()).await {
            tracing::warn!(error = %e, "relaying reverse response");
        }
    }
}

/// Lines of a `setBreakpoints` request, from `breakpoints` or the legacy `lines`.
fn requested_lines(arguments: &Value) -> Vec<i64> {
    if let Some(breakpoints) = arguments.get("breakpoints").and_then(Value::as_array) {
        return breakpoints
            .iter()
            .filter_map(|bp| bp.get("line").and_then(Value::as_i64))
            .collect();
    }
    arguments
        .get("lines")
        .and_then(Value::as_array)
        .map(|lines| lines.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default()
}

/// Installs breakpoints by forwarding the client's own request.
///
/// Conditions, hit counts and log messages survive; only the source path
/// changes. `sent` fires once the request is on its way to the backend.
struct ForwardedBreakpoints {
    backend: Arc<Backend>,
    arguments: Value,
    sent: Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait]
impl BreakpointInstaller for ForwardedBreakpoints {
    async fn install(
        &self,
        remote_path: &str,
        lines: &[i64],
    ) -> eyre::Result<Vec<VerifiedBreakpoint>> {
        let mut arguments = self.arguments.clone();
        if let Some(source) = arguments.get_mut("source").and_then(Value::as_object_mut) {
            source.insert("path".to_string(), remote_path.into());
            source.remove("sourceReference");
        }

        let pending = self
            .backend
            .send_request("setBreakpoints", Some(arguments))
            .await;
        let sent = lock(&self.sent).take();
        if let Some(sent) = sent {
            let _ = sent.send(());
        }

        let response = self.backend.wait(pending?).await?;
        verified_breakpoints(response, lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_from_either_form() {
        assert_eq!(
            requested_lines(&json!({"breakpoints": [{"line": 3}, {"line": 7, "condition": "x"}]})),
            vec![3, 7]
        );
        assert_eq!(requested_lines(&json!({"lines": [4]})), vec![4]);
        assert!(requested_lines(&json!({})).is_empty());
    }
}
