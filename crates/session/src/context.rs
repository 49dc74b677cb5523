//! State that lives exactly as long as one client session.

use std::{
    fmt,
    str::FromStr,
    sync::{Arc, OnceLock},
    time::Duration,
};

use eyre::WrapErr;
use paths::{AssumeExists, HostFiles, MappingRule, OsFamily, PathMapper, infer_client_os};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{
    BreakpointTranslator, ConfigurationSink, DEFAULT_FETCH_TIMEOUT, DebuggeeConnection,
    FrameSourceResolver, SessionError, SourceContentService, SourceReference, SourceRegistry,
};

const CLIENT_OS_OPTION: &str = "CLIENT_OS_TYPE=";

/// Path translation settings taken from a `launch` or `attach` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Rules in precedence order
    pub path_mappings: Vec<MappingRule>,
    pub client_os: Option<String>,
    /// The debuggee's working directory, anchor for `"."` remote roots
    pub cwd: Option<String>,
    pub fetch_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path_mappings: Vec::new(),
            client_os: None,
            cwd: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestArguments {
    #[serde(default)]
    path_mappings: Vec<MappingRule>,
    #[serde(rename = "clientOS")]
    client_os: Option<String>,
    #[serde(default)]
    debug_options: Vec<String>,
    cwd: Option<String>,
}

impl SessionConfig {
    /// Read the settings out of `launch` / `attach` arguments.
    ///
    /// `clientOS` takes precedence over a `CLIENT_OS_TYPE=` debug option.
    /// Unknown keys are ignored.
    pub fn from_arguments(arguments: &serde_json::Value) -> eyre::Result<Self> {
        let args = RequestArguments::deserialize(arguments)
            .wrap_err("invalid path mapping arguments")?;
        let client_os = args.client_os.or_else(|| {
            args.debug_options
                .iter()
                .find_map(|o| o.strip_prefix(CLIENT_OS_OPTION))
                .map(str::to_string)
        });
        Ok(Self {
            path_mappings: args.path_mappings,
            client_os,
            cwd: args.cwd,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        })
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

/// How the session decides whether a translated local path exists
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// Check the adapter's filesystem when the client runs the same OS family,
    /// otherwise trust the mapping.
    #[default]
    Auto,
    Host,
    Assume,
}

impl FromStr for ProbeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ProbeMode::Auto),
            "host" => Ok(ProbeMode::Host),
            "assume" => Ok(ProbeMode::Assume),
            other => Err(format!("unknown probe mode {other:?}, expected auto, host or assume")),
        }
    }
}

impl fmt::Display for ProbeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProbeMode::Auto => "auto",
            ProbeMode::Host => "host",
            ProbeMode::Assume => "assume",
        })
    }
}

#[derive(Debug)]
struct Configured {
    mapper: PathMapper,
    client_os: OsFamily,
    fetch_timeout: Duration,
}

/// Everything one client session owns.
///
/// The mapping rules are set once, before requests that depend on them are
/// handled, and read-only afterwards. Handlers receive the context by
/// reference; nothing here is global.
#[derive(Debug)]
pub struct SessionContext {
    configured: OnceLock<Configured>,
    unconfigured: PathMapper,
    registry: Arc<SourceRegistry>,
    cancellation: CancellationToken,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self::with_reference_floor(0)
    }

    /// A session whose source references all lie above `floor`.
    pub fn with_reference_floor(floor: SourceReference) -> Self {
        Self {
            configured: OnceLock::new(),
            unconfigured: PathMapper::empty(),
            registry: Arc::new(SourceRegistry::with_floor(floor)),
            cancellation: CancellationToken::new(),
        }
    }

    /// Install the mapping rules and report the client OS to `sink`.
    ///
    /// Only the first call takes effect.
    pub fn configure(
        &self,
        config: SessionConfig,
        probe: ProbeMode,
        sink: &dyn ConfigurationSink,
    ) -> Result<OsFamily, SessionError> {
        if self.cancellation.is_cancelled() {
            return Err(SessionError::Ended);
        }
        if self.configured.get().is_some() {
            return Err(SessionError::AlreadyConfigured);
        }

        let client_os = infer_client_os(&config.path_mappings, config.client_os.as_deref());
        let mapper = PathMapper::new(config.path_mappings, client_os.profile(), config.cwd);
        let host_visible = client_os == OsFamily::host() || client_os == OsFamily::Unknown;
        let mapper = match probe {
            ProbeMode::Host => mapper.with_probe(HostFiles),
            ProbeMode::Assume => mapper.with_probe(AssumeExists),
            ProbeMode::Auto if host_visible => mapper.with_probe(HostFiles),
            ProbeMode::Auto => mapper.with_probe(AssumeExists),
        };

        self.configured
            .set(Configured {
                mapper,
                client_os,
                fetch_timeout: config.fetch_timeout,
            })
            .map_err(|_| SessionError::AlreadyConfigured)?;

        tracing::info!(%client_os, %probe, rules = self.mapper().rules().count(), "session configured");
        sink.set_client_os(client_os);
        Ok(client_os)
    }

    /// The session's mapper; a mapper without rules before configuration.
    pub fn mapper(&self) -> &PathMapper {
        self.configured
            .get()
            .map(|c| &c.mapper)
            .unwrap_or(&self.unconfigured)
    }

    pub fn client_os(&self) -> OsFamily {
        self.configured
            .get()
            .map(|c| c.client_os)
            .unwrap_or(OsFamily::Unknown)
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.configured
            .get()
            .map(|c| c.fetch_timeout)
            .unwrap_or(DEFAULT_FETCH_TIMEOUT)
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Token that fires when the session ends
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn frames(&self) -> FrameSourceResolver<'_> {
        FrameSourceResolver::new(self.mapper(), &self.registry)
    }

    pub fn breakpoints(&self) -> BreakpointTranslator<'_> {
        BreakpointTranslator::new(self.mapper())
    }

    pub fn content(&self, connection: Arc<dyn DebuggeeConnection>) -> SourceContentService {
        SourceContentService::new(
            Arc::clone(&self.registry),
            connection,
            self.cancellation.clone(),
        )
        .with_timeout(self.fetch_timeout())
    }

    /// End the session: outstanding fetches resolve as unavailable.
    ///
    /// Returns the highest source reference the session issued, which is
    /// the floor for the next session.
    pub fn teardown(&self) -> SourceReference {
        if !self.cancellation.is_cancelled() {
            tracing::debug!(references = self.registry.len(), "tearing down session");
            self.cancellation.cancel();
        }
        self.registry.high_water()
    }

    pub fn is_ended(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct Sink(Mutex<Vec<OsFamily>>);

    impl ConfigurationSink for Sink {
        fn set_client_os(&self, os: OsFamily) {
            self.0.lock().unwrap().push(os);
        }
    }

    #[test]
    fn config_from_launch_arguments() {
        let config = SessionConfig::from_arguments(&json!({
            "program": "/remote/dir/code.py",
            "cwd": "/remote/dir",
            "pathMappings": [{"localRoot": "C:\\TEMP\\src", "remoteRoot": "."}],
            "debugOptions": ["RedirectOutput", "CLIENT_OS_TYPE=INVALID"],
        }))
        .unwrap();

        assert_eq!(config.path_mappings, vec![MappingRule::new("C:\\TEMP\\src", ".")]);
        assert_eq!(config.client_os.as_deref(), Some("INVALID"));
        assert_eq!(config.cwd.as_deref(), Some("/remote/dir"));
        assert_eq!(config.fetch_timeout, DEFAULT_FETCH_TIMEOUT);
    }

    #[test]
    fn client_os_key_beats_debug_option() {
        let config = SessionConfig::from_arguments(&json!({
            "clientOS": "unix",
            "debugOptions": ["CLIENT_OS_TYPE=WINDOWS"],
        }))
        .unwrap();
        assert_eq!(config.client_os.as_deref(), Some("unix"));
    }

    #[test]
    fn malformed_mappings_are_rejected() {
        assert!(SessionConfig::from_arguments(&json!({"pathMappings": [{"localRoot": 1}]})).is_err());
    }

    #[test]
    fn configures_once() {
        let context = SessionContext::new();
        let sink = Sink::default();
        let config = SessionConfig {
            path_mappings: vec![MappingRule::new("C:\\TEMP\\src", "/remote/dir")],
            client_os: Some(String::new()),
            ..Default::default()
        };

        let os = context
            .configure(config.clone(), ProbeMode::Assume, &sink)
            .unwrap();
        assert_eq!(os, OsFamily::Windows);
        assert_eq!(context.client_os(), OsFamily::Windows);
        assert_eq!(
            context.configure(config, ProbeMode::Assume, &sink),
            Err(SessionError::AlreadyConfigured)
        );
        assert_eq!(sink.0.lock().unwrap().as_slice(), &[OsFamily::Windows]);
    }

    #[test]
    fn unconfigured_session_passes_paths_through() {
        let context = SessionContext::new();
        assert_eq!(context.mapper().to_remote("/a/b.py"), "/a/b.py");
        assert_eq!(context.client_os(), OsFamily::Unknown);
    }

    #[test]
    fn teardown_returns_floor_for_next_session() {
        let context = SessionContext::with_reference_floor(10);
        let reference = context.registry().allocate("/lib/x.py");
        assert_eq!(reference, 11);
        assert_eq!(context.teardown(), 11);
        assert!(context.is_ended());
        assert_eq!(
            context.configure(SessionConfig::default(), ProbeMode::Auto, &Sink::default()),
            Err(SessionError::Ended)
        );
    }

    #[test]
    fn probe_mode_parses() {
        assert_eq!("Assume".parse(), Ok(ProbeMode::Assume));
        assert!("sometimes".parse::<ProbeMode>().is_err());
    }
}
