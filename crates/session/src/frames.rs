use paths::{PathError, PathMapper};
use serde::Serialize;

use crate::{SourceReference, SourceRegistry};

/// How the client should open the file a stack frame points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    #[serde(rename = "path")]
    pub display_path: String,
    pub source_reference: SourceReference,
}

impl SourceDescriptor {
    /// Whether the client can open `display_path` directly.
    pub fn is_local(&self) -> bool {
        self.source_reference == 0
    }
}

/// Annotates stack frames with a local path or a source reference.
#[derive(Debug, Clone, Copy)]
pub struct FrameSourceResolver<'a> {
    mapper: &'a PathMapper,
    registry: &'a SourceRegistry,
}

impl<'a> FrameSourceResolver<'a> {
    pub fn new(mapper: &'a PathMapper, registry: &'a SourceRegistry) -> Self {
        Self { mapper, registry }
    }

    /// Resolve the file a frame in the debuggee points at.
    ///
    /// A path that maps to an existing local file is handed to the client as
    /// is, with reference 0. Anything else keeps its remote path and gets a
    /// reference the client can fetch content with.
    pub fn resolve(&self, remote_frame_path: &str) -> SourceDescriptor {
        match self.mapper.to_local(remote_frame_path) {
            Ok(local) => SourceDescriptor {
                display_path: local,
                source_reference: 0,
            },
            Err(e) => {
                match &e {
                    PathError::LocalMiss { candidate, .. } => {
                        tracing::debug!(remote = remote_frame_path, %candidate, "mapped frame source is not a local file")
                    }
                    _ => tracing::trace!(remote = remote_frame_path, "unmapped frame source"),
                }
                SourceDescriptor {
                    display_path: remote_frame_path.to_string(),
                    source_reference: self.registry.allocate(remote_frame_path),
                }
            }
        }
    }
}
