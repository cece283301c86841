use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Name of the scratch playlist used while no stored playlist is open.
pub const BUFFER_PLAYLIST: &str = "~buffer~";

const PERSISTED_FIELD_SEPARATOR: char = '|';

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TrackEntry {
    pub source: String,
    pub note: String,
}

impl TrackEntry {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            note: String::new(),
        }
    }

    pub fn with_note(source: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            note: note.into(),
        }
    }

    /// Serialized form stored in the config file: `Source|note`.
    ///
    /// The first character of the source is upper-cased; older files were
    /// written that way and value lookups depend on it. Reading splits at the
    /// first `|`, so a source holding one would not survive a save; see
    /// [`TrackEntry::source_is_storable`].
    pub fn persisted(&self) -> String {
        format!(
            "{}{PERSISTED_FIELD_SEPARATOR}{}",
            capitalize_first(&self.source),
            self.note
        )
    }

    /// Parses a stored entry. Strings without a separator are legacy
    /// source-only entries.
    pub fn from_persisted(raw: &str) -> Self {
        match raw.split_once(PERSISTED_FIELD_SEPARATOR) {
            Some((source, note)) => Self::with_note(source, note),
            None => Self::new(raw),
        }
    }

    /// Whether `source` comes back unchanged from its persisted form.
    pub fn source_is_storable(source: &str) -> bool {
        !source.contains(PERSISTED_FIELD_SEPARATOR)
    }

    /// Filesystem path for the locator, with any `file://` scheme removed.
    pub fn path(&self) -> PathBuf {
        locator_path(&self.source)
    }

    pub fn display_name(&self) -> String {
        let path = self.path();
        path.file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source.clone())
    }
}

pub fn locator_path(locator: &str) -> PathBuf {
    let stripped = locator
        .strip_prefix("file:///")
        .map(|rest| {
            if cfg!(windows) {
                rest.to_string()
            } else {
                format!("/{rest}")
            }
        })
        .or_else(|| locator.strip_prefix("file://").map(str::to_string))
        .unwrap_or_else(|| locator.to_string());
    PathBuf::from(stripped)
}

pub fn capitalize_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedState {
    #[serde(default)]
    pub playlists: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub auto_load: bool,
    #[serde(default = "default_auto_play")]
    pub auto_play: bool,
    #[serde(default = "default_volume")]
    pub volume: u8,
    #[serde(default)]
    pub last_playlist: Option<String>,
    /// Keys this build does not use, written back untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_auto_play() -> bool {
    true
}

fn default_volume() -> u8 {
    50
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            playlists: BTreeMap::new(),
            auto_load: false,
            auto_play: default_auto_play(),
            volume: default_volume(),
            last_playlist: None,
            extra: serde_json::Map::new(),
        }
    }
}

impl PersistedState {
    /// State as it should be written: the scratch playlist never reaches disk.
    pub fn for_write(&self) -> Self {
        let mut state = self.clone();
        state.playlists.remove(BUFFER_PLAYLIST);
        if state.last_playlist.as_deref() == Some(BUFFER_PLAYLIST) {
            state.last_playlist = None;
        }
        state
    }

    /// State as it should be used after a read: the scratch playlist always
    /// exists and always starts empty.
    pub fn hydrated(mut self) -> Self {
        self.playlists.insert(BUFFER_PLAYLIST.to_string(), Vec::new());
        self.volume = self.volume.min(100);
        self
    }

    /// Stored playlist names, scratch playlist excluded.
    pub fn playlist_names(&self) -> Vec<&str> {
        self.playlists
            .keys()
            .map(String::as_str)
            .filter(|name| *name != BUFFER_PLAYLIST)
            .collect()
    }
}
