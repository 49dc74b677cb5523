//! Test helpers for code that drives a session.
//!
//! [`FakeDebuggee`] stands in for the running program: it has an in-memory
//! filesystem in the debuggee's namespace, records breakpoints and can hold
//! file reads open. [`Backchannel`] is the side channel a test uses to hear
//! from the fake debuggee outside the debug protocol.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use paths::OsFamily;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};

use crate::{BreakpointInstaller, ConfigurationSink, DebuggeeConnection, VerifiedBreakpoint};

const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// One end of a FIFO side channel.
///
/// Messages arrive in the order they were sent. The channel closes when the
/// other end is dropped.
#[derive(Debug)]
pub struct Backchannel {
    tx: mpsc::UnboundedSender<Value>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Value>>,
    timeout: Duration,
}

/// Create both ends of a backchannel.
pub fn backchannel() -> (Backchannel, Backchannel) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        Backchannel {
            tx: a_tx,
            rx: tokio::sync::Mutex::new(b_rx),
            timeout: DEFAULT_RECEIVE_TIMEOUT,
        },
        Backchannel {
            tx: b_tx,
            rx: tokio::sync::Mutex::new(a_rx),
            timeout: DEFAULT_RECEIVE_TIMEOUT,
        },
    )
}

impl Backchannel {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn send(&self, message: Value) -> eyre::Result<()> {
        self.tx
            .send(message)
            .map_err(|_| eyre::eyre!("backchannel closed"))
    }

    /// Wait for the next message.
    pub async fn receive(&self) -> eyre::Result<Value> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(self.timeout, rx.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => eyre::bail!("backchannel closed"),
            Err(_) => eyre::bail!("no backchannel message within {:?}", self.timeout),
        }
    }
}

#[derive(Debug, Default)]
struct DebuggeeState {
    files: HashMap<String, String>,
    breakpoints: Vec<(String, Vec<i64>)>,
    stack: Option<Vec<String>>,
    client_os: Option<OsFamily>,
    reads: usize,
}

/// A debuggee with an in-memory filesystem.
#[derive(Debug)]
pub struct FakeDebuggee {
    state: Mutex<DebuggeeState>,
    reads_open: watch::Sender<bool>,
    backchannel: Option<Backchannel>,
}

impl Default for FakeDebuggee {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDebuggee {
    pub fn new() -> Self {
        let (reads_open, _) = watch::channel(true);
        Self {
            state: Mutex::new(DebuggeeState::default()),
            reads_open,
            backchannel: None,
        }
    }

    fn state(&self) -> MutexGuard<'_, DebuggeeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a file at `remote_path`.
    pub fn with_file(self, remote_path: impl Into<String>, content: impl Into<String>) -> Self {
        self.state().files.insert(remote_path.into(), content.into());
        self
    }

    /// Report the client OS over `backchannel` once configured.
    pub fn with_backchannel(mut self, backchannel: Backchannel) -> Self {
        self.backchannel = Some(backchannel);
        self
    }

    /// Make file reads wait until [`FakeDebuggee::release_reads`].
    pub fn hold_reads(&self) {
        self.reads_open.send_replace(false);
    }

    pub fn release_reads(&self) {
        self.reads_open.send_replace(true);
    }

    /// Set the frames reported by [`FakeDebuggee::stack`], innermost first.
    pub fn set_stack(&self, frames: Vec<String>) {
        self.state().stack = Some(frames);
    }

    /// Remote paths of the current stack frames, innermost first.
    ///
    /// Without an explicit stack, the program is stopped at the first file
    /// a breakpoint was installed in.
    pub fn stack(&self) -> Vec<String> {
        let state = self.state();
        match &state.stack {
            Some(frames) => frames.clone(),
            None => state
                .breakpoints
                .iter()
                .find(|(_, lines)| !lines.is_empty())
                .map(|(path, _)| vec![path.clone()])
                .unwrap_or_default(),
        }
    }

    /// Every breakpoint request received, in order.
    pub fn breakpoints(&self) -> Vec<(String, Vec<i64>)> {
        self.state().breakpoints.clone()
    }

    pub fn client_os(&self) -> Option<OsFamily> {
        self.state().client_os
    }

    /// Number of file reads started, including ones still waiting.
    pub fn reads(&self) -> usize {
        self.state().reads
    }
}

#[async_trait]
impl BreakpointInstaller for FakeDebuggee {
    async fn install(
        &self,
        remote_path: &str,
        lines: &[i64],
    ) -> eyre::Result<Vec<VerifiedBreakpoint>> {
        let mut state = self.state();
        let exists = state.files.contains_key(remote_path);
        state
            .breakpoints
            .push((remote_path.to_string(), lines.to_vec()));
        Ok(lines
            .iter()
            .map(|&line| VerifiedBreakpoint::at(line, exists))
            .collect())
    }
}

#[async_trait]
impl DebuggeeConnection for FakeDebuggee {
    async fn read_file(&self, remote_path: &str) -> eyre::Result<String> {
        self.state().reads += 1;

        let mut open = self.reads_open.subscribe();
        open.wait_for(|open| *open)
            .await
            .map(|_| ())
            .map_err(|_| eyre::eyre!("debuggee gone"))?;

        self.state()
            .files
            .get(remote_path)
            .cloned()
            .ok_or_else(|| eyre::eyre!("no such file: {remote_path}"))
    }
}

impl ConfigurationSink for FakeDebuggee {
    fn set_client_os(&self, os: OsFamily) {
        self.state().client_os = Some(os);
        if let Some(backchannel) = &self.backchannel {
            if let Err(e) = backchannel.send(json!({ "ide_os": os })) {
                tracing::warn!(error = %e, "could not report client OS");
            }
        }
    }
}
