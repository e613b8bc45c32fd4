//! Network store implementations

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, instrument};

use crate::domain::NetworkSnapshot;
use crate::infrastructure::traits::{FileSystem, NetworkStore};

/// Network persisted as one pretty-printed JSON document.
pub struct JsonFileStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NetworkStore for JsonFileStore {
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    fn load(&self) -> io::Result<Option<NetworkSnapshot>> {
        if !self.fs.exists(&self.path) {
            debug!("data file missing");
            return Ok(None);
        }
        let content = self.fs.read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        let snapshot = serde_json::from_str(&content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(snapshot))
    }

    #[instrument(level = "debug", skip_all, fields(path = %self.path.display(), elements = snapshot.elements.len()))]
    fn save(&self, snapshot: &NetworkSnapshot) -> io::Result<()> {
        let mut content = serde_json::to_string_pretty(snapshot)?;
        content.push('\n');
        self.fs.ensure_parent(&self.path)?;
        self.fs.write(&self.path, &content)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<NetworkSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: NetworkSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
        }
    }

    fn poisoned() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "memory store lock poisoned")
    }
}

impl NetworkStore for MemoryStore {
    fn load(&self) -> io::Result<Option<NetworkSnapshot>> {
        let guard = self.snapshot.lock().map_err(|_| Self::poisoned())?;
        Ok(guard.clone())
    }

    fn save(&self, snapshot: &NetworkSnapshot) -> io::Result<()> {
        let mut guard = self.snapshot.lock().map_err(|_| Self::poisoned())?;
        *guard = Some(snapshot.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "<memory>".to_string()
    }
}
