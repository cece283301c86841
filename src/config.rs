use crate::model::PersistedState;
use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

const APP_DIR: &str = "vaudio";
const STATE_FILE: &str = "state.json";
const LOG_FILE: &str = "vaudio.log";

/// Load/save boundary for the config document.
///
/// Implementations must drop the scratch playlist on every write and
/// return it empty on every read.
pub trait StatePort {
    fn load(&self) -> Result<PersistedState>;
    fn save(&self, state: &PersistedState) -> Result<()>;
}

impl<T: StatePort + ?Sized> StatePort for Arc<T> {
    fn load(&self) -> Result<PersistedState> {
        (**self).load()
    }

    fn save(&self, state: &PersistedState) -> Result<()> {
        (**self).save(state)
    }
}

pub fn config_root() -> Result<PathBuf> {
    if let Ok(override_dir) = env::var("VAUDIO_CONFIG_DIR") {
        return Ok(PathBuf::from(override_dir));
    }

    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .context("neither HOME nor USERPROFILE is set")?;
    Ok(PathBuf::from(home).join(".config").join(APP_DIR))
}

pub fn log_path(root: &Path) -> PathBuf {
    root.join(LOG_FILE)
}

pub fn ensure_dir(root: &Path) -> Result<()> {
    fs::create_dir_all(root).with_context(|| format!("failed to create {}", root.display()))
}

/// Canonical form of a user-supplied path, without the `\\?\` prefix
/// Windows adds on canonicalization.
pub fn normalize_path(path: &Path) -> PathBuf {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let raw = canonical.to_string_lossy();

    if let Some(trimmed) = raw.strip_prefix(r"\\?\UNC\") {
        return PathBuf::from(format!(r"\\{trimmed}"));
    }
    if let Some(trimmed) = raw.strip_prefix(r"\\?\") {
        return PathBuf::from(trimmed);
    }
    canonical
}

/// `state.json` inside a config directory.
#[derive(Debug, Clone)]
pub struct JsonStateFile {
    path: PathBuf,
}

impl JsonStateFile {
    pub fn in_dir(root: &Path) -> Self {
        Self {
            path: root.join(STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatePort for JsonStateFile {
    fn load(&self) -> Result<PersistedState> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no state file, using defaults");
            return Ok(PersistedState::default().hydrated());
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read state file {}", self.path.display()))?;
        let state: PersistedState = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse state file {}", self.path.display()))?;
        Ok(state.hydrated())
    }

    fn save(&self, state: &PersistedState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }
        let json = serde_json::to_string_pretty(&state.for_write())?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        debug!(path = %self.path.display(), "state saved");
        Ok(())
    }
}

/// In-memory port; keeps the last written document and a save counter.
#[derive(Debug, Default)]
pub struct MemoryStatePort {
    stored: Mutex<Option<PersistedState>>,
    saves: Mutex<usize>,
}

impl MemoryStatePort {
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            stored: Mutex::new(Some(state.for_write())),
            saves: Mutex::new(0),
        }
    }

    pub fn stored(&self) -> Option<PersistedState> {
        self.stored
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn save_count(&self) -> usize {
        *self
            .saves
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl StatePort for MemoryStatePort {
    fn load(&self) -> Result<PersistedState> {
        Ok(self.stored().unwrap_or_default().hydrated())
    }

    fn save(&self, state: &PersistedState) -> Result<()> {
        *self
            .stored
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(state.for_write());
        *self
            .saves
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) += 1;
        Ok(())
    }
}
