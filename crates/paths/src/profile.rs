//! Path conventions of one filesystem namespace, and lexical path handling
//! under those conventions.

use serde::{Deserialize, Serialize};

use crate::OsFamily;

/// Path separator used when rendering a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Separator {
    Slash,
    Backslash,
}

impl Separator {
    pub fn as_char(self) -> char {
        match self {
            Separator::Slash => '/',
            Separator::Backslash => '\\',
        }
    }
}

/// Case sensitivity and separator convention of one side of the connection.
///
/// The client, the debuggee and the machine running the adapter may all
/// differ, so a profile is always stated explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformProfile {
    pub case_sensitive: bool,
    pub separator: Separator,
}

impl PlatformProfile {
    pub const POSIX: Self = Self {
        case_sensitive: true,
        separator: Separator::Slash,
    };

    pub const WINDOWS: Self = Self {
        case_sensitive: false,
        separator: Separator::Backslash,
    };

    pub const MAC: Self = Self {
        case_sensitive: false,
        separator: Separator::Slash,
    };

    pub fn for_os(os: OsFamily) -> Self {
        match os {
            OsFamily::Windows => Self::WINDOWS,
            OsFamily::Mac => Self::MAC,
            OsFamily::Linux | OsFamily::Unknown => Self::POSIX,
        }
    }

    /// The profile implied by how `path` is written.
    ///
    /// A drive letter followed by a backslash, or a UNC prefix, is Windows.
    /// Everything else is POSIX.
    pub fn from_path_shape(path: &str) -> Self {
        if is_windows_shaped(path) {
            Self::WINDOWS
        } else {
            Self::POSIX
        }
    }

    pub fn is_windows_style(&self) -> bool {
        self.separator == Separator::Backslash
    }

    fn is_separator(&self, c: char) -> bool {
        c == '/' || (self.is_windows_style() && c == '\\')
    }

    fn segment_eq(&self, a: &str, b: &str) -> bool {
        if self.case_sensitive {
            a == b
        } else {
            a == b || a.to_lowercase() == b.to_lowercase()
        }
    }
}

pub(crate) fn is_windows_shaped(path: &str) -> bool {
    if path.starts_with("\\\\") {
        return true;
    }
    let mut chars = path.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(drive), Some(':'), Some('\\')) => drive.is_ascii_alphabetic(),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Root {
    Relative,
    /// `/`, or `\` without a drive
    Separator,
    /// `C:\`
    Drive(char),
    /// `C:` with no separator after it
    DriveRelative(char),
    /// `\\server\share`, server and share being the first two segments
    Unc,
}

impl Root {
    fn matches(self, other: Root) -> bool {
        match (self, other) {
            (Root::Drive(a), Root::Drive(b)) | (Root::DriveRelative(a), Root::DriveRelative(b)) => {
                a.eq_ignore_ascii_case(&b)
            }
            (a, b) => a == b,
        }
    }

    fn is_absolute(self) -> bool {
        !matches!(self, Root::Relative | Root::DriveRelative(_))
    }
}

/// A path reduced to its root and segments under one profile.
///
/// Repeated separators, `.` segments and trailing separators are dropped and
/// `..` is resolved lexically. The original spelling of every segment is kept
/// so that rendering preserves case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NormalizedPath {
    root: Root,
    segments: Vec<String>,
}

impl NormalizedPath {
    pub(crate) fn parse(path: &str, profile: PlatformProfile) -> Self {
        let (root, rest) = split_root(path, profile);
        let mut segments: Vec<String> = Vec::new();
        for segment in rest.split(|c| profile.is_separator(c)) {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.last().is_some_and(|s| s != "..") {
                        segments.pop();
                    } else if !root.is_absolute() {
                        segments.push("..".to_string());
                    }
                }
                s => segments.push(s.to_string()),
            }
        }
        Self { root, segments }
    }

    /// The segments of `self` below `prefix`, if `prefix` covers whole
    /// leading segments of `self`.
    pub(crate) fn strip_prefix<'a>(
        &'a self,
        prefix: &NormalizedPath,
        profile: PlatformProfile,
    ) -> Option<&'a [String]> {
        if !self.root.matches(prefix.root) || prefix.segments.len() > self.segments.len() {
            return None;
        }
        let covered = self
            .segments
            .iter()
            .zip(&prefix.segments)
            .all(|(a, b)| profile.segment_eq(a, b));
        covered.then(|| &self.segments[prefix.segments.len()..])
    }

    pub(crate) fn same_as(&self, other: &NormalizedPath, profile: PlatformProfile) -> bool {
        self.segments.len() == other.segments.len()
            && self.strip_prefix(other, profile).is_some()
    }

    pub(crate) fn join(&self, suffix: &[String]) -> Self {
        let mut joined = self.clone();
        joined.segments.extend(suffix.iter().cloned());
        joined
    }

    pub(crate) fn render(&self, separator: Separator) -> String {
        let sep = separator.as_char();
        let mut out = String::new();
        match self.root {
            Root::Relative => {}
            Root::Separator => out.push(sep),
            Root::Drive(drive) => {
                out.push(drive);
                out.push(':');
                out.push(sep);
            }
            Root::DriveRelative(drive) => {
                out.push(drive);
                out.push(':');
            }
            Root::Unc => {
                out.push(sep);
                out.push(sep);
            }
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push(sep);
            }
            out.push_str(segment);
        }
        if out.is_empty() {
            out.push('.');
        }
        out
    }
}

fn split_root(path: &str, profile: PlatformProfile) -> (Root, &str) {
    if profile.is_windows_style() {
        if let Some(rest) = path.strip_prefix("\\\\").or_else(|| path.strip_prefix("//")) {
            return (Root::Unc, rest);
        }
        let bytes = path.as_bytes();
        if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            let drive = bytes[0] as char;
            let rest = &path[2..];
            return match rest.chars().next() {
                Some(c) if profile.is_separator(c) => (Root::Drive(drive), rest),
                _ => (Root::DriveRelative(drive), rest),
            };
        }
    }
    match path.chars().next() {
        Some(c) if profile.is_separator(c) => (Root::Separator, path),
        _ => (Root::Relative, path),
    }
}
