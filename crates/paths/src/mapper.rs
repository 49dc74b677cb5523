use std::{fmt, path::Path, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    PathError, PlatformProfile,
    profile::NormalizedPath,
};

/// Remote root that stands for the debuggee's working directory
const CWD_ANCHOR: &str = ".";

/// One `localRoot` / `remoteRoot` pair, as found in `pathMappings`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRule {
    pub local_root: String,
    pub remote_root: String,
}

impl MappingRule {
    pub fn new(local_root: impl Into<String>, remote_root: impl Into<String>) -> Self {
        Self {
            local_root: local_root.into(),
            remote_root: remote_root.into(),
        }
    }

    /// Whether the remote root is anchored to the debuggee's working directory.
    pub fn is_cwd_anchored(&self) -> bool {
        self.remote_root == CWD_ANCHOR
    }
}

/// Answers whether a translated local path names an existing file.
pub trait FileProbe: fmt::Debug + Send + Sync {
    fn is_file(&self, path: &str) -> bool;
}

/// Probes the filesystem of the machine running the adapter.
///
/// Only meaningful when the client shares that filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostFiles;

impl FileProbe for HostFiles {
    fn is_file(&self, path: &str) -> bool {
        Path::new(path).is_file()
    }
}

/// Treats every translated path as present.
///
/// For clients whose filesystem is not visible from the adapter, e.g. a
/// Windows IDE talking to an adapter on Linux.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeExists;

impl FileProbe for AssumeExists {
    fn is_file(&self, _path: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: MappingRule,
    local: NormalizedPath,
    remote: NormalizedPath,
    remote_profile: PlatformProfile,
}

/// Bidirectional translator between client paths and debuggee paths.
///
/// Rules are tried in the order they were configured and the first match
/// wins, even when a later rule has a longer matching prefix. The mapper is
/// immutable once built and can be shared freely between tasks.
#[derive(Debug, Clone)]
pub struct PathMapper {
    rules: Vec<CompiledRule>,
    local_profile: PlatformProfile,
    remote_cwd: Option<String>,
    probe: Arc<dyn FileProbe>,
}

impl Default for PathMapper {
    fn default() -> Self {
        Self::empty()
    }
}

impl PathMapper {
    /// Build a mapper from rules in precedence order.
    ///
    /// `remote_cwd` is the debuggee's working directory, used by rules whose
    /// remote root is `"."`. Local paths are checked with [`HostFiles`] unless
    /// another probe is set with [`PathMapper::with_probe`].
    pub fn new(
        rules: Vec<MappingRule>,
        local_profile: PlatformProfile,
        remote_cwd: Option<String>,
    ) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let remote_root = if rule.is_cwd_anchored() {
                    remote_cwd.as_deref().unwrap_or(CWD_ANCHOR)
                } else {
                    rule.remote_root.as_str()
                };
                let remote_profile = PlatformProfile::from_path_shape(remote_root);
                CompiledRule {
                    local: NormalizedPath::parse(&rule.local_root, local_profile),
                    remote: NormalizedPath::parse(remote_root, remote_profile),
                    remote_profile,
                    rule,
                }
            })
            .collect();

        Self {
            rules,
            local_profile,
            remote_cwd,
            probe: Arc::new(HostFiles),
        }
    }

    /// A mapper without rules: every path passes through `to_remote` unchanged
    /// and every `to_local` is a miss.
    pub fn empty() -> Self {
        Self::new(Vec::new(), PlatformProfile::POSIX, None)
    }

    pub fn with_probe(mut self, probe: impl FileProbe + 'static) -> Self {
        self.probe = Arc::new(probe);
        self
    }

    /// The configured rules, in precedence order.
    pub fn rules(&self) -> impl Iterator<Item = &MappingRule> {
        self.rules.iter().map(|r| &r.rule)
    }

    pub fn local_profile(&self) -> PlatformProfile {
        self.local_profile
    }

    pub fn remote_cwd(&self) -> Option<&str> {
        self.remote_cwd.as_deref()
    }

    /// Translate a client path into the debuggee's namespace.
    ///
    /// A path that no rule covers is returned unchanged, on the assumption
    /// that it is already valid on the remote side.
    pub fn to_remote(&self, local_path: &str) -> String {
        self.try_to_remote(local_path).unwrap_or_else(|| {
            tracing::trace!(local = local_path, "no mapping to remote");
            local_path.to_string()
        })
    }

    /// Like [`PathMapper::to_remote`], but `None` when no rule covers the path.
    pub fn try_to_remote(&self, local_path: &str) -> Option<String> {
        let local = NormalizedPath::parse(local_path, self.local_profile);
        self.rules.iter().find_map(|compiled| {
            let suffix = local.strip_prefix(&compiled.local, self.local_profile)?;
            let remote = compiled
                .remote
                .join(suffix)
                .render(compiled.remote_profile.separator);
            tracing::trace!(local = local_path, %remote, rule = ?compiled.rule, "mapped to remote");
            Some(remote)
        })
    }

    /// Translate a debuggee path into the client's namespace.
    ///
    /// Succeeds only when a rule matches and the translated path is an
    /// existing local file. The remote path is never handed back as if it
    /// were local; callers decide what to do on a miss.
    pub fn to_local(&self, remote_path: &str) -> Result<String, PathError> {
        for compiled in &self.rules {
            let remote = NormalizedPath::parse(remote_path, compiled.remote_profile);
            let Some(suffix) = remote.strip_prefix(&compiled.remote, compiled.remote_profile)
            else {
                continue;
            };

            let local = compiled
                .local
                .join(suffix)
                .render(self.local_profile.separator);
            if self.probe.is_file(&local) {
                tracing::trace!(remote = remote_path, %local, "mapped to local");
                return Ok(local);
            }
            return Err(PathError::LocalMiss {
                remote: remote_path.to_string(),
                candidate: local,
            });
        }
        Err(PathError::UnmappedPath {
            path: remote_path.to_string(),
        })
    }

    /// Whether two client paths name the same file under the client's profile.
    pub fn same_local_path(&self, a: &str, b: &str) -> bool {
        let a = NormalizedPath::parse(a, self.local_profile);
        let b = NormalizedPath::parse(b, self.local_profile);
        a.same_as(&b, self.local_profile)
    }
}
