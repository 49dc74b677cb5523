//! Handles for remote files that have no local counterpart.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::SourceError;

/// Identifier of a remote-only source, as sent in `sourceReference`.
///
/// Zero is reserved for "open the path locally" and is never issued.
pub type SourceReference = i64;

#[derive(Debug, Default)]
struct Handles {
    by_path: HashMap<String, SourceReference>,
    by_reference: HashMap<SourceReference, String>,
    last: SourceReference,
}

/// Allocates and resolves source references for one session.
///
/// Allocation is check-or-insert under a single lock, so concurrent callers
/// asking for the same path always agree on its reference. References start
/// just above the registry's floor and only ever increase. Everything at or
/// below the floor belongs to an earlier session and is reported as stale.
#[derive(Debug)]
pub struct SourceRegistry {
    floor: SourceReference,
    handles: Mutex<Handles>,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::with_floor(0)
    }

    /// A registry whose first reference is `floor + 1`.
    pub fn with_floor(floor: SourceReference) -> Self {
        let floor = floor.max(0);
        Self {
            floor,
            handles: Mutex::new(Handles {
                last: floor,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Handles> {
        // the map is consistent after every insert, so a poisoned lock is still usable
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The reference for `remote_path`, allocating one on first sight.
    pub fn allocate(&self, remote_path: &str) -> SourceReference {
        let mut handles = self.lock();
        if let Some(&reference) = handles.by_path.get(remote_path) {
            return reference;
        }

        handles.last += 1;
        let reference = handles.last;
        handles.by_path.insert(remote_path.to_string(), reference);
        handles
            .by_reference
            .insert(reference, remote_path.to_string());
        tracing::debug!(%reference, path = remote_path, "allocated source reference");
        reference
    }

    /// The remote path behind `reference`.
    pub fn resolve(&self, reference: SourceReference) -> Result<String, SourceError> {
        if reference <= 0 {
            return Err(SourceError::SourceUnavailable { reference });
        }
        if reference <= self.floor {
            return Err(SourceError::StaleHandle { reference });
        }
        self.lock()
            .by_reference
            .get(&reference)
            .cloned()
            .ok_or(SourceError::SourceUnavailable { reference })
    }

    /// The highest reference issued so far, or the floor if none was.
    pub fn high_water(&self) -> SourceReference {
        self.lock().last
    }

    pub fn len(&self) -> usize {
        self.lock().by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
