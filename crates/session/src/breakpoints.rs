use eyre::WrapErr;
use paths::PathMapper;

use crate::{BreakpointInstaller, VerifiedBreakpoint};

/// A breakpoint as reported to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledBreakpoint {
    pub id: Option<i64>,
    pub line: i64,
    pub verified: bool,
    /// Path the client can recognise, or the debuggee's path when no mapping
    /// leads back to a local file.
    pub path: String,
    /// Set when `path` is the debuggee's path echoed verbatim.
    pub unmapped: bool,
    pub message: Option<String>,
}

/// Converts breakpoint requests from client paths to debuggee paths and back.
#[derive(Debug, Clone, Copy)]
pub struct BreakpointTranslator<'a> {
    mapper: &'a PathMapper,
}

impl<'a> BreakpointTranslator<'a> {
    pub fn new(mapper: &'a PathMapper) -> Self {
        Self { mapper }
    }

    #[tracing::instrument(skip(self, installer))]
    pub async fn install(
        &self,
        installer: &dyn BreakpointInstaller,
        client_path: &str,
        lines: &[i64],
    ) -> eyre::Result<Vec<InstalledBreakpoint>> {
        let remote_path = self.mapper.to_remote(client_path);
        tracing::debug!(%remote_path, "installing breakpoints");

        let verified = installer
            .install(&remote_path, lines)
            .await
            .wrap_err_with(|| format!("installing breakpoints in {remote_path}"))?;

        Ok(verified
            .into_iter()
            .map(|bp| self.reverse(client_path, &remote_path, bp))
            .collect())
    }

    fn reverse(
        &self,
        client_path: &str,
        remote_path: &str,
        bp: VerifiedBreakpoint,
    ) -> InstalledBreakpoint {
        let reported = bp.path.as_deref().unwrap_or(remote_path);

        // the client's own spelling wins only when the mapping round-trips to it
        let (path, unmapped) = match self.mapper.to_local(reported) {
            Ok(local) if self.mapper.same_local_path(&local, client_path) => {
                (client_path.to_string(), false)
            }
            Ok(local) => (local, false),
            Err(e) => {
                tracing::debug!(error = %e, "breakpoint reported in an unmapped file");
                (reported.to_string(), true)
            }
        };

        let message = match (bp.message, unmapped) {
            (Some(message), _) => Some(message),
            (None, true) => Some(format!("{path} is not mapped to a local file")),
            (None, false) => None,
        };

        InstalledBreakpoint {
            id: bp.id,
            line: bp.line,
            verified: bp.verified,
            path,
            unmapped,
            message,
        }
    }
}
