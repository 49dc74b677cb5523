//! Rewriting DAP `Source` objects from the backend for the frontend.

use serde_json::Value;
use session::FrameSourceResolver;
use transport::Event;

use crate::backend::Backend;

/// Points backend sources at local files or at our own source references.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SourceRewriter<'a> {
    resolver: FrameSourceResolver<'a>,
    backend: &'a Backend,
}

impl<'a> SourceRewriter<'a> {
    pub(crate) fn new(resolver: FrameSourceResolver<'a>, backend: &'a Backend) -> Self {
        Self { resolver, backend }
    }

    /// Rewrite one `Source` in place.
    ///
    /// Returns `false` for a source without a path, which the frontend could
    /// neither open nor fetch.
    pub(crate) fn source(&self, source: &mut Value) -> bool {
        let Some(object) = source.as_object_mut() else {
            return false;
        };
        let Some(remote) = object.get("path").and_then(Value::as_str).map(str::to_string) else {
            return false;
        };
        if let Some(reference) = object.get("sourceReference").and_then(Value::as_i64) {
            self.backend.remember_source(&remote, reference);
        }

        let descriptor = self.resolver.resolve(&remote);
        object.insert("path".to_string(), descriptor.display_path.into());
        object.insert(
            "sourceReference".to_string(),
            descriptor.source_reference.into(),
        );
        if let Some(Value::Array(children)) = object.get_mut("sources") {
            children.retain_mut(|child| self.source(child));
        }
        true
    }

    /// Rewrite `key` of `object`, removing it when it has no path.
    fn source_field(&self, object: &mut Value, key: &str) {
        let Some(object) = object.as_object_mut() else {
            return;
        };
        let keep = match object.get_mut(key) {
            Some(source) => self.source(source),
            None => return,
        };
        if !keep {
            object.remove(key);
        }
    }

    /// Body of a `stackTrace` response.
    pub(crate) fn stack_trace(&self, body: &mut Value) {
        if let Some(Value::Array(frames)) = body.get_mut("stackFrames") {
            for frame in frames {
                self.source_field(frame, "source");
            }
        }
    }

    /// Body of a `loadedSources` response.
    pub(crate) fn loaded_sources(&self, body: &mut Value) {
        if let Some(Value::Array(sources)) = body.get_mut("sources") {
            sources.retain_mut(|source| self.source(source));
        }
    }

    /// Events that carry a source: `breakpoint`, `loadedSource` and `output`.
    pub(crate) fn event(&self, event: &mut Event) {
        let Some(body) = event.body.as_mut() else {
            return;
        };
        match event.event.as_str() {
            "breakpoint" => {
                if let Some(breakpoint) = body.get_mut("breakpoint") {
                    self.source_field(breakpoint, "source");
                }
            }
            "loadedSource" | "output" => self.source_field(body, "source"),
            _ => {}
        }
    }
}
