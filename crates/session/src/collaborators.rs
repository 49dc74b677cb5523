//! Interfaces to the parts of the debugger this crate does not implement.

use async_trait::async_trait;
use paths::OsFamily;

/// One breakpoint as reported back by the installer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedBreakpoint {
    /// Installer's identifier, for later breakpoint events
    pub id: Option<i64>,
    pub line: i64,
    pub verified: bool,
    /// Path the installer reported, in the debuggee's namespace. `None` means
    /// the path the breakpoint was requested on.
    pub path: Option<String>,
    pub message: Option<String>,
}

impl VerifiedBreakpoint {
    pub fn at(line: i64, verified: bool) -> Self {
        Self {
            id: None,
            line,
            verified,
            path: None,
            message: None,
        }
    }
}

/// Installs breakpoints in the running debuggee
#[async_trait]
pub trait BreakpointInstaller: Send + Sync {
    /// Replace the breakpoints in `remote_path` with one per requested line.
    async fn install(
        &self,
        remote_path: &str,
        lines: &[i64],
    ) -> eyre::Result<Vec<VerifiedBreakpoint>>;
}

/// The live connection to the debuggee
#[async_trait]
pub trait DebuggeeConnection: Send + Sync {
    /// Read the contents of a file as the debuggee sees it.
    async fn read_file(&self, remote_path: &str) -> eyre::Result<String>;
}

/// Receives session settings that the debuggee must know about
pub trait ConfigurationSink: Send + Sync {
    fn set_client_os(&self, os: OsFamily);
}
