use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{DebuggeeConnection, SourceError, SourceReference, SourceRegistry};

/// How long a content fetch may wait on the debuggee by default
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Serves file content for source references.
///
/// Each fetch runs as its own task. It ends early with
/// [`SourceError::Cancelled`] when the session's token fires, or with
/// [`SourceError::TimedOut`] when the debuggee takes too long.
#[derive(Clone)]
pub struct SourceContentService {
    registry: Arc<SourceRegistry>,
    connection: Arc<dyn DebuggeeConnection>,
    cancellation: CancellationToken,
    timeout: Duration,
}

impl std::fmt::Debug for SourceContentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceContentService")
            .field("registry", &self.registry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SourceContentService {
    pub fn new(
        registry: Arc<SourceRegistry>,
        connection: Arc<dyn DebuggeeConnection>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            registry,
            connection,
            cancellation,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch the content behind `reference`.
    ///
    /// Does not allocate or change any reference.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, reference: SourceReference) -> Result<String, SourceError> {
        let path = self.registry.resolve(reference)?;
        if self.cancellation.is_cancelled() {
            return Err(SourceError::Cancelled { path });
        }

        let connection = Arc::clone(&self.connection);
        let task_path = path.clone();
        let task = tokio::spawn(async move { connection.read_file(&task_path).await });
        let abort = task.abort_handle();

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => {
                abort.abort();
                tracing::debug!(%path, "session ended during fetch");
                Err(SourceError::Cancelled { path })
            }
            res = tokio::time::timeout(self.timeout, task) => match res {
                Ok(Ok(Ok(content))) => Ok(content),
                Ok(Ok(Err(_))) if self.cancellation.is_cancelled() => {
                    Err(SourceError::Cancelled { path })
                }
                Ok(Ok(Err(e))) => {
                    tracing::warn!(error = %e, %path, "debuggee could not read file");
                    Err(SourceError::Fetch { path, source: e.into() })
                }
                Ok(Err(e)) => Err(SourceError::Fetch { path, source: e.into() }),
                Err(_) => {
                    abort.abort();
                    tracing::warn!(%path, after = ?self.timeout, "fetch timed out");
                    Err(SourceError::TimedOut { path, after: self.timeout })
                }
            },
        }
    }
}
