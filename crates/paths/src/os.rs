use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{MappingRule, PathError, PlatformProfile, profile::is_windows_shaped};

/// Operating system family of one side of a debug session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OsFamily {
    Windows,
    Linux,
    Mac,
    Unknown,
}

impl OsFamily {
    /// Path conventions used for this family
    pub fn profile(self) -> PlatformProfile {
        PlatformProfile::for_os(self)
    }

    pub fn is_windows(self) -> bool {
        matches!(self, OsFamily::Windows)
    }

    /// The family of the machine running this process.
    pub fn host() -> Self {
        if cfg!(windows) {
            OsFamily::Windows
        } else if cfg!(target_os = "macos") {
            OsFamily::Mac
        } else if cfg!(unix) {
            OsFamily::Linux
        } else {
            OsFamily::Unknown
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OsFamily::Windows => "WINDOWS",
            OsFamily::Linux => "LINUX",
            OsFamily::Mac => "MAC",
            OsFamily::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

impl FromStr for OsFamily {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" | "win" | "win32" => Ok(OsFamily::Windows),
            "linux" | "unix" | "posix" => Ok(OsFamily::Linux),
            "mac" | "macos" | "darwin" | "osx" => Ok(OsFamily::Mac),
            _ => Err(PathError::UnrecognizedOs(s.to_string())),
        }
    }
}

/// Decide which operating system family the client runs on.
///
/// A recognized `explicit_override` always wins. An empty or unrecognized
/// override is ignored and the family is inferred from the first rule's local
/// root: a drive letter followed by a backslash means Windows, anything else
/// means a POSIX family. Without rules there is nothing to go on and the
/// result is [`OsFamily::Unknown`].
pub fn infer_client_os(rules: &[MappingRule], explicit_override: Option<&str>) -> OsFamily {
    if let Some(value) = explicit_override.map(str::trim).filter(|v| !v.is_empty()) {
        match value.parse() {
            Ok(os) => return os,
            Err(e) => tracing::warn!(error = %e, "ignoring client OS override"),
        }
    }

    match rules.first() {
        Some(rule) if is_windows_shaped(&rule.local_root) => OsFamily::Windows,
        Some(_) => OsFamily::Linux,
        None => OsFamily::Unknown,
    }
}
