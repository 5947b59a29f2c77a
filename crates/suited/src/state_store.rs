//! Cache and method snapshots carried from one `suitegen` run to the next.
//!
//! A run holds an exclusive lock on `<dir>/run.lock` for its whole lifetime,
//! so two processes never generate against the same state at once. The OS
//! drops the lock when the holder exits, crashed or not.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use suite_cache::{CacheSnapshot, InvalidatorSnapshot, StaticInvalidator, TestCaseCache};
use suite_core::GeneratorConfig;
use tracing::{debug, info, warn};

use fs2::FileExt;

const STATE_FILE: &str = "state.json";
const LOCK_FILE: &str = "run.lock";
const STATE_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("another suitegen run is using {}", .path.display())]
    Busy { path: PathBuf },
    #[error("state file {} failed: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode state: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PersistedState {
    version: u32,
    #[serde(default)]
    cache: CacheSnapshot,
    #[serde(default)]
    methods: InvalidatorSnapshot,
}

/// What `StateStore::load` put back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoredState {
    pub entries: usize,
    pub classes: usize,
}

/// Held for the duration of a run; dropping it releases the lock.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            debug!(path = %self.path.display(), error = %err, "failed to release run lock");
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `None` when persistence is switched off.
    pub fn from_config(config: &GeneratorConfig) -> Option<Self> {
        config
            .state
            .persist
            .then(|| Self::new(config.state.resolved_dir(&config.project.root)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn ensure_dir(&self) -> Result<(), StateStoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StateStoreError::Io {
            path: self.dir.clone(),
            source,
        })
    }

    /// Takes the run lock without waiting.
    pub fn lock(&self) -> Result<RunLock, StateStoreError> {
        self.ensure_dir()?;
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| StateStoreError::Io {
                path: path.clone(),
                source,
            })?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                debug!(path = %path.display(), "acquired run lock");
                Ok(RunLock { file, path })
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => Err(StateStoreError::Busy { path }),
            Err(source) => Err(StateStoreError::Io { path, source }),
        }
    }

    /// Restores the saved state into `cache` and `invalidator`. A missing
    /// file is an empty state; an unreadable or foreign one is ignored with
    /// a warning and overwritten by the next save.
    pub fn load(
        &self,
        cache: &TestCaseCache,
        invalidator: &StaticInvalidator,
    ) -> Result<RestoredState, StateStoreError> {
        let path = self.state_path();
        let body = match fs::read_to_string(&path) {
            Ok(body) => body,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no saved state");
                return Ok(RestoredState::default());
            }
            Err(source) => return Err(StateStoreError::Io { path, source }),
        };

        let state: PersistedState = match serde_json::from_str(&body) {
            Ok(state) => state,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable saved state");
                return Ok(RestoredState::default());
            }
        };
        if state.version != STATE_VERSION {
            warn!(
                path = %path.display(),
                found = state.version,
                expected = STATE_VERSION,
                "ignoring saved state from another version"
            );
            return Ok(RestoredState::default());
        }

        invalidator.restore(&state.methods);
        let restored = RestoredState {
            entries: cache.restore(&state.cache),
            classes: state.methods.classes.len(),
        };
        info!(
            path = %path.display(),
            entries = restored.entries,
            classes = restored.classes,
            "restored saved state"
        );
        Ok(restored)
    }

    /// Writes the current state next to the final file, then renames it
    /// into place.
    pub fn save(
        &self,
        cache: &TestCaseCache,
        invalidator: &StaticInvalidator,
    ) -> Result<(), StateStoreError> {
        self.ensure_dir()?;
        let state = PersistedState {
            version: STATE_VERSION,
            cache: cache.snapshot(),
            methods: invalidator.snapshot(),
        };
        let body =
            serde_json::to_string(&state).map_err(|source| StateStoreError::Encode { source })?;

        let path = self.state_path();
        let staged = path.with_extension("tmp");
        fs::write(&staged, body).map_err(|source| StateStoreError::Io {
            path: staged.clone(),
            source,
        })?;
        fs::rename(&staged, &path).map_err(|source| StateStoreError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(
            path = %path.display(),
            entries = state.cache.entry_count(),
            classes = state.methods.classes.len(),
            "saved state"
        );
        Ok(())
    }
}
