use crate::config::normalize_path;
use lofty::prelude::{Accessor, AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg", "m4a", "aac", "opus"];

/// What the information panel shows for the loaded track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackInfo {
    pub title: String,
    pub artist: Option<String>,
    pub duration: Option<Duration>,
}

pub fn is_audio(path: &Path) -> bool {
    let ext = path.extension().and_then(OsStr::to_str).unwrap_or_default();
    AUDIO_EXTENSIONS
        .iter()
        .any(|supported| ext.eq_ignore_ascii_case(supported))
}

/// Audio files under `root`, sorted by path.
pub fn scan_folder(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_audio(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    found.sort();
    found
}

/// Locators to append for a user-supplied path: a folder expands to its
/// audio files, a file is taken as is.
pub fn sources_for(path: &Path) -> Vec<String> {
    let normalized = normalize_path(path);
    if normalized.is_dir() {
        return scan_folder(&normalized)
            .into_iter()
            .map(|path| path.to_string_lossy().to_string())
            .collect();
    }
    vec![normalized.to_string_lossy().to_string()]
}

/// Tag title or, failing that, the file stem.
pub fn track_info(path: &Path) -> TrackInfo {
    let fallback_title = path
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("unknown")
        .to_string();

    let Ok(tagged_file) = Probe::open(path).and_then(|probe| probe.read()) else {
        return TrackInfo {
            title: fallback_title,
            ..TrackInfo::default()
        };
    };

    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag());
    let title = tag
        .and_then(|tag| tag.title())
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or(fallback_title);
    let artist = tag
        .and_then(|tag| tag.artist())
        .map(|artist| artist.trim().to_string())
        .filter(|artist| !artist.is_empty());
    let duration = Some(tagged_file.properties().duration()).filter(|duration| !duration.is_zero());

    TrackInfo {
        title,
        artist,
        duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn scan_filters_non_audio_files() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("nested")).expect("mkdir");
        fs::write(dir.path().join("b.MP3"), b"x").expect("write mp3");
        fs::write(dir.path().join("nested").join("a.flac"), b"x").expect("write flac");
        fs::write(dir.path().join("notes.txt"), b"x").expect("write txt");

        let found = scan_folder(dir.path());
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("b.MP3"));
        assert!(found[1].ends_with("nested/a.flac"));
    }

    #[test]
    fn sources_for_file_is_single_entry() {
        let dir = tempdir().expect("tempdir");
        let track = dir.path().join("one.wav");
        fs::write(&track, b"x").expect("write");

        let sources = sources_for(&track);
        assert_eq!(sources.len(), 1);
        assert!(sources[0].ends_with("one.wav"));
    }

    #[test]
    fn sources_for_folder_expands() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("a.ogg"), b"x").expect("write");
        fs::write(dir.path().join("b.ogg"), b"x").expect("write");
        assert_eq!(sources_for(dir.path()).len(), 2);
    }

    #[test]
    fn untagged_file_falls_back_to_stem() {
        let dir = tempdir().expect("tempdir");
        let track = dir.path().join("Night Drive.mp3");
        fs::write(&track, b"not audio").expect("write");

        let info = track_info(&track);
        assert_eq!(info.title, "Night Drive");
        assert_eq!(info.artist, None);
    }
}
