//! Snapshot persistence. The JSON layout here — task id keyed to
//! `{cron, name}` plus a capture timestamp — is the only on-disk format the
//! scheduler defines.

use std::path::PathBuf;
use std::sync::Mutex;

use reflow_core::ScheduleSnapshot;
use tracing::warn;

use crate::error::Result;

/// Load/store seam for the persisted schedule snapshot.
pub trait SnapshotStore: Send + Sync {
    /// The last persisted snapshot, or `None` when none exists yet.
    fn load(&self) -> Result<Option<ScheduleSnapshot>>;

    /// Replace the persisted snapshot wholesale.
    fn save(&self, snapshot: &ScheduleSnapshot) -> Result<()>;
}

impl<S: SnapshotStore> SnapshotStore for std::sync::Arc<S> {
    fn load(&self) -> Result<Option<ScheduleSnapshot>> {
        (**self).load()
    }

    fn save(&self, snapshot: &ScheduleSnapshot) -> Result<()> {
        (**self).save(snapshot)
    }
}

/// Snapshot persisted as a pretty-printed JSON file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> Result<Option<ScheduleSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                // A corrupt cache is recoverable: treat as first discovery.
                warn!(path = %self.path.display(), error = %e, "unreadable snapshot file; starting from empty");
                Ok(None)
            }
        }
    }

    fn save(&self, snapshot: &ScheduleSnapshot) -> Result<()> {
        let raw = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

/// In-process store for tests and single-invocation callers.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<ScheduleSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> Result<Option<ScheduleSnapshot>> {
        Ok(self.snapshot.lock().unwrap().clone())
    }

    fn save(&self, snapshot: &ScheduleSnapshot) -> Result<()> {
        *self.snapshot.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    }
}
