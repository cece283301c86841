//! Interaction-thread owner of the open playlist, the cursor and the config
//!
//! Every method that mutates the store re-clamps the cursor before it
//! returns. Methods that drive playback take the player as an argument so the
//! session never outlives or owns the audio device.

use crate::audio::{MediaPlayer, PlayerEvent};
use crate::cache::SENTINEL_LEVELS;
use crate::config::StatePort;
use crate::cursor::{Advance, AutoAdvance, CursorEvent, PlaybackCursor};
use crate::error::{QueueError, Result};
use crate::library::{self, TrackInfo};
use crate::model::{BUFFER_PLAYLIST, PersistedState, TrackEntry};
use crate::playlist::PlaylistStore;
use crate::transfer;
use crate::waveform::{AnalysisHandle, LevelPipeline};
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const VOLUME_STEP: u8 = 4;
pub const INVALID_MEDIA_NOTICE: &str = "Invalid media. Please try again";

pub struct Session {
    port: Box<dyn StatePort>,
    state: PersistedState,
    store: PlaylistStore,
    cursor: PlaybackCursor,
    pipeline: LevelPipeline,
    analysis: Option<AnalysisHandle>,
    loaded: Option<String>,
    info: Option<TrackInfo>,
    pub selected: usize,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub status: String,
    pub dirty: bool,
}

impl Session {
    pub fn open(port: Box<dyn StatePort>, pipeline: LevelPipeline) -> anyhow::Result<Self> {
        let state = port.load()?;
        info!(playlists = state.playlist_names().len(), "state loaded");
        Ok(Self {
            port,
            state,
            store: PlaylistStore::buffer(),
            cursor: PlaybackCursor::new(),
            pipeline,
            analysis: None,
            loaded: None,
            info: None,
            selected: 0,
            position_ms: 0,
            duration_ms: 0,
            status: String::from("Buffer mode"),
            dirty: true,
        })
    }

    pub fn store(&self) -> &PlaylistStore {
        &self.store
    }

    pub fn cursor(&self) -> &PlaybackCursor {
        &self.cursor
    }

    pub fn subscribe_cursor(&mut self) -> Receiver<CursorEvent> {
        self.cursor.subscribe()
    }

    pub fn state(&self) -> &PersistedState {
        &self.state
    }

    pub fn pipeline(&self) -> &LevelPipeline {
        &self.pipeline
    }

    pub fn loaded_source(&self) -> Option<&str> {
        self.loaded.as_deref()
    }

    pub fn track_info(&self) -> Option<&TrackInfo> {
        self.info.as_ref()
    }

    /// Handle of the most recent analysis the session started, if any.
    pub fn take_analysis(&mut self) -> Option<AnalysisHandle> {
        self.analysis.take()
    }

    pub fn playlist_names(&self) -> Vec<String> {
        self.state
            .playlist_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Playlist to reopen at startup, if the last one is still stored.
    pub fn startup_playlist(&self) -> Option<String> {
        self.state
            .last_playlist
            .clone()
            .filter(|name| self.state.playlists.contains_key(name) && name != BUFFER_PLAYLIST)
    }

    pub fn auto_advance(&self) -> AutoAdvance {
        AutoAdvance {
            auto_play: self.state.auto_play,
            auto_load: self.state.auto_load,
        }
    }

    pub fn volume(&self) -> u8 {
        self.state.volume
    }

    /// Config document with the open playlist's mirror written back.
    pub fn persisted_state(&self) -> PersistedState {
        let mut state = self.state.clone();
        if !self.store.is_buffer() {
            state
                .playlists
                .insert(self.store.name().to_string(), self.store.mirror().to_vec());
            state.last_playlist = Some(self.store.name().to_string());
        } else {
            state.last_playlist = None;
        }
        state
    }

    pub fn save(&mut self) -> anyhow::Result<()> {
        self.state = self.persisted_state();
        self.port.save(&self.state)?;
        info!(playlist = self.store.name(), "state saved");
        self.set_status("State saved");
        Ok(())
    }

    pub fn open_playlist(&mut self, name: &str, player: &mut dyn MediaPlayer) -> Result<()> {
        if !self.state.playlists.contains_key(name) {
            let err = QueueError::PlaylistNotFound(name.to_string());
            self.set_status(&err.to_string());
            return Err(err);
        }

        self.state = self.persisted_state();
        let persisted = self.state.playlists.get(name).cloned().unwrap_or_default();
        self.store = PlaylistStore::hydrate(name, &persisted);
        self.cursor.resync(0);
        self.store_changed();
        self.selected = 0;
        info!(playlist = name, entries = self.store.len(), "playlist opened");

        if self.store.is_buffer() {
            self.set_status("Buffer mode");
            return Ok(());
        }
        self.set_status(&format!("Playlist {name}"));
        if self.state.auto_load && !self.store.is_empty() {
            self.load_current(player);
        }
        Ok(())
    }

    pub fn new_playlist(&mut self, name: &str, player: &mut dyn MediaPlayer) -> Result<()> {
        let name = name.trim();
        if name.is_empty() || name == BUFFER_PLAYLIST {
            let err = QueueError::ReservedName(name.to_string());
            self.set_status(&err.to_string());
            return Err(err);
        }
        if self.state.playlists.contains_key(name) {
            self.set_status("Current playlist already exists");
            return Err(QueueError::PlaylistExists(name.to_string()));
        }

        self.state.playlists.insert(name.to_string(), Vec::new());
        self.save_or_report();
        self.open_playlist(name, player)
    }

    pub fn close_playlist(&mut self, player: &mut dyn MediaPlayer) {
        self.save_or_report();
        // The buffer key is always present after hydration.
        let _ = self.open_playlist(BUFFER_PLAYLIST, player);
    }

    pub fn delete_playlist(&mut self, player: &mut dyn MediaPlayer) -> Result<()> {
        if self.store.is_buffer() {
            let err = QueueError::ReservedName(BUFFER_PLAYLIST.to_string());
            self.set_status("Buffer cannot be deleted");
            return Err(err);
        }

        let name = self.store.name().to_string();
        self.state.playlists.remove(&name);
        self.store = PlaylistStore::buffer();
        self.cursor.resync(0);
        self.store_changed();
        self.save_or_report();
        let _ = self.open_playlist(BUFFER_PLAYLIST, player);
        info!(playlist = %name, "playlist deleted");
        self.set_status(&format!("Deleted playlist {name}"));
        Ok(())
    }

    /// Appends `sources`, skipping any that could not be stored faithfully.
    pub fn add_sources(&mut self, sources: Vec<String>) -> usize {
        let (storable, skipped): (Vec<String>, Vec<String>) = sources
            .into_iter()
            .partition(|source| TrackEntry::source_is_storable(source));
        for source in &skipped {
            warn!(source = %source, "skipping source containing '|'");
        }
        let count = storable.len();
        self.store
            .append(storable.into_iter().map(TrackEntry::new).collect());
        self.store_changed();
        if skipped.is_empty() {
            self.set_status(&format!("Added {count} tracks"));
        } else {
            self.set_status(&format!(
                "Added {count} tracks, skipped {} with '|' in the path",
                skipped.len()
            ));
        }
        count
    }

    /// Adds a file, or every audio file below a folder.
    pub fn add_path(&mut self, path: &Path) -> usize {
        let sources = library::sources_for(path);
        if sources.is_empty() {
            self.set_status("No audio files found");
            return 0;
        }
        self.add_sources(sources)
    }

    pub fn remove_rows(&mut self, rows: &[usize]) -> Result<Vec<TrackEntry>> {
        match self.store.remove_rows(rows) {
            Ok(removed) => {
                self.store_changed();
                self.set_status(&format!("Removed {} tracks", removed.len()));
                Ok(removed)
            }
            Err(err) => {
                self.set_status(&err.to_string());
                Err(err)
            }
        }
    }

    pub fn remove_selected(&mut self) -> Result<Vec<TrackEntry>> {
        if self.store.is_empty() {
            self.set_status("Nothing selected");
            return Ok(Vec::new());
        }
        self.remove_rows(&[self.selected])
    }

    /// Drags one row to `destination` through the transfer codec.
    pub fn move_row(&mut self, row: usize, destination: usize) -> Result<usize> {
        let moved = transfer::encode_rows(&self.store, &[row]).and_then(|payload| {
            transfer::reorder(&mut self.store, &payload, Some(&[row]), destination)
        });
        if let Ok(landed) = moved {
            self.cursor.follow_move(row, landed);
        }
        self.after_drop(moved)
    }

    pub fn move_selected_up(&mut self) -> Result<usize> {
        self.move_row(self.selected, self.selected.saturating_sub(1))
    }

    pub fn move_selected_down(&mut self) -> Result<usize> {
        self.move_row(self.selected, self.selected + 1)
    }

    /// Drop of a payload dragged inside this playlist, origin rows unknown.
    pub fn drop_payload(&mut self, payload: &[u8], destination: usize) -> Result<usize> {
        let landed = transfer::reorder(&mut self.store, payload, None, destination);
        self.after_drop(landed)
    }

    /// Drop of a payload dragged from another playlist.
    pub fn drop_foreign(&mut self, payload: &[u8], destination: usize) -> Result<usize> {
        let landed = transfer::copy_into(&mut self.store, payload, destination);
        self.after_drop(landed)
    }

    pub fn set_note(&mut self, row: usize, note: &str) -> Result<()> {
        match self.store.set_note(row, note) {
            Ok(()) => {
                self.dirty = true;
                self.set_status("Note updated");
                Ok(())
            }
            Err(err) => {
                self.set_status(&err.to_string());
                Err(err)
            }
        }
    }

    pub fn select_next(&mut self) {
        if self.store.is_empty() {
            return;
        }
        self.selected = (self.selected + 1).min(self.store.len() - 1);
        self.dirty = true;
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
        self.dirty = true;
    }

    /// Double activation: the row becomes current and starts playing.
    pub fn activate_row(&mut self, row: usize, player: &mut dyn MediaPlayer) -> Result<()> {
        if let Err(err) = self.cursor.jump_to(row, self.store.len()) {
            self.set_status(&err.to_string());
            return Err(err);
        }
        self.play_new(player);
        Ok(())
    }

    pub fn activate_selected(&mut self, player: &mut dyn MediaPlayer) -> Result<()> {
        self.activate_row(self.selected, player)
    }

    pub fn next_song(&mut self, player: &mut dyn MediaPlayer) {
        if self.cursor.next(self.store.len()).is_some() {
            self.play_new(player);
        }
    }

    pub fn previous_song(&mut self, player: &mut dyn MediaPlayer) {
        if self.cursor.previous(self.store.len()).is_some() {
            self.play_new(player);
        }
    }

    pub fn play_toggle(&mut self, player: &mut dyn MediaPlayer) {
        if player.current_source().is_none() {
            if !self.store.is_empty() {
                self.play_new(player);
            }
            return;
        }
        if player.is_paused() {
            player.play();
            self.set_status("Playing");
        } else {
            player.pause();
            self.set_status("Paused");
        }
    }

    pub fn stop(&mut self, player: &mut dyn MediaPlayer) {
        player.stop();
        self.position_ms = 0;
        self.set_status("Stopped");
    }

    /// Moves the playback position by `delta_ms`, clamped to the track.
    pub fn seek_by(&mut self, delta_ms: i64, player: &mut dyn MediaPlayer) {
        if player.current_source().is_none() {
            return;
        }
        let mut target = self.position_ms.saturating_add_signed(delta_ms);
        if self.duration_ms > 0 {
            target = target.min(self.duration_ms);
        }
        match player.set_position(Duration::from_millis(target)) {
            Ok(()) => {
                self.position_ms = target;
                self.dirty = true;
            }
            Err(err) => self.set_status(&format!("seek error: {err:#}")),
        }
    }

    pub fn toggle_repeat(&mut self) -> bool {
        let enabled = self.cursor.toggle_repeat();
        self.set_status(if enabled { "Repeat on" } else { "Repeat off" });
        enabled
    }

    pub fn set_auto_load(&mut self, enabled: bool) {
        self.state.auto_load = enabled;
        self.set_status(&format!("Auto load {}", on_off(enabled)));
    }

    pub fn set_auto_play(&mut self, enabled: bool) {
        self.state.auto_play = enabled;
        self.set_status(&format!("Auto play {}", on_off(enabled)));
    }

    pub fn volume_up(&mut self, player: &mut dyn MediaPlayer) {
        self.set_volume(self.state.volume.saturating_add(VOLUME_STEP), player);
    }

    pub fn volume_down(&mut self, player: &mut dyn MediaPlayer) {
        self.set_volume(self.state.volume.saturating_sub(VOLUME_STEP), player);
    }

    pub fn set_volume(&mut self, volume: u8, player: &mut dyn MediaPlayer) {
        self.state.volume = volume.min(100);
        self.apply_volume(player);
        self.set_status(&format!("Volume: {}%", self.state.volume));
    }

    pub fn apply_volume(&self, player: &mut dyn MediaPlayer) {
        player.set_volume(f32::from(self.state.volume) / 100.0);
    }

    pub fn handle_player_event(&mut self, event: PlayerEvent, player: &mut dyn MediaPlayer) {
        match event {
            PlayerEvent::SourceChanged(_) => self.dirty = true,
            PlayerEvent::PositionChanged(position) => {
                self.position_ms = position;
                self.dirty = true;
            }
            PlayerEvent::DurationChanged(duration) => {
                self.duration_ms = duration;
                self.dirty = true;
            }
            PlayerEvent::EndOfMedia => {
                let advance = self
                    .cursor
                    .on_end_of_media(self.store.len(), self.auto_advance());
                debug!(?advance, "end of media");
                match advance {
                    Advance::Replay | Advance::Play(_) => self.play_new(player),
                    Advance::Load(_) => {
                        self.load_current(player);
                    }
                    Advance::Stop => self.set_status("Playback finished"),
                }
            }
            PlayerEvent::InvalidMedia(path) => {
                warn!(path = %path.display(), "invalid media");
                self.set_status(INVALID_MEDIA_NOTICE);
            }
        }
    }

    /// Loudness pair for the meter at the current position.
    pub fn meter_levels(&self) -> (f32, f32) {
        match self.loaded.as_deref() {
            Some(source) => self.pipeline.cache().query(source, self.position_ms),
            None => SENTINEL_LEVELS,
        }
    }

    /// Hands the cursor's track to the player without starting it.
    pub fn load_current(&mut self, player: &mut dyn MediaPlayer) -> bool {
        let Some(entry) = self.store.get(self.cursor.current_index()).cloned() else {
            return false;
        };

        if let Some(handle) = self.pipeline.ensure(&entry.source) {
            self.analysis = Some(handle);
        }
        self.loaded = Some(entry.source.clone());
        self.position_ms = 0;
        self.duration_ms = 0;
        self.dirty = true;

        let path = entry.path();
        if let Err(err) = player.set_source(&path) {
            warn!(source = %entry.source, "failed to load source: {err:#}");
            self.info = None;
            self.handle_player_event(PlayerEvent::InvalidMedia(path), player);
            return false;
        }

        self.apply_volume(player);
        self.duration_ms = player
            .duration()
            .map(|duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        self.info = Some(library::track_info(&path));
        self.set_status(&format!("Loaded {}", entry.display_name()));
        true
    }

    fn play_new(&mut self, player: &mut dyn MediaPlayer) {
        if self.load_current(player) {
            player.play();
            if let Some(entry) = self.store.get(self.cursor.current_index()) {
                let name = entry.display_name();
                self.set_status(&format!("Playing {name}"));
            }
        }
    }

    fn after_drop(&mut self, result: Result<usize>) -> Result<usize> {
        match result {
            Ok(landed) => {
                self.store_changed();
                self.selected = landed.min(self.store.len().saturating_sub(1));
                Ok(landed)
            }
            Err(err) => {
                self.set_status(&err.to_string());
                Err(err)
            }
        }
    }

    fn store_changed(&mut self) {
        self.cursor.resync(self.store.len());
        self.selected = self.selected.min(self.store.len().saturating_sub(1));
        self.dirty = true;
    }

    fn save_or_report(&mut self) {
        if let Err(err) = self.save() {
            warn!("save failed: {err:#}");
            self.set_status(&format!("save error: {err:#}"));
        }
    }

    fn set_status(&mut self, status: &str) {
        self.status = status.to_string();
        self.dirty = true;
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LevelCache;
    use crate::config::MemoryStatePort;
    use crate::cursor::CursorState;
    use crate::waveform::{Analyzer, MIN_LEVEL_DB, StereoLevels};
    use std::path::PathBuf;
    use std::sync::Arc;

    #[derive(Default)]
    struct TestPlayer {
        source: Option<PathBuf>,
        paused: bool,
        plays: usize,
        volume: f32,
    }

    impl MediaPlayer for TestPlayer {
        fn set_source(&mut self, path: &Path) -> anyhow::Result<()> {
            if path.to_string_lossy().contains("broken") {
                self.source = None;
                anyhow::bail!("unsupported media");
            }
            self.source = Some(path.to_path_buf());
            self.paused = true;
            Ok(())
        }

        fn play(&mut self) {
            self.paused = false;
            self.plays += 1;
        }

        fn pause(&mut self) {
            self.paused = true;
        }

        fn stop(&mut self) {
            self.paused = true;
        }

        fn set_position(&mut self, _position: Duration) -> anyhow::Result<()> {
            Ok(())
        }

        fn position(&self) -> Option<Duration> {
            self.source.as_ref().map(|_| Duration::ZERO)
        }

        fn duration(&self) -> Option<Duration> {
            None
        }

        fn is_paused(&self) -> bool {
            self.paused
        }

        fn is_finished(&self) -> bool {
            false
        }

        fn current_source(&self) -> Option<&Path> {
            self.source.as_deref()
        }

        fn volume(&self) -> f32 {
            self.volume
        }

        fn set_volume(&mut self, volume: f32) {
            self.volume = volume;
        }
    }

    struct RampAnalyzer;

    impl Analyzer for RampAnalyzer {
        fn analyze(&self, _source: &str) -> StereoLevels {
            StereoLevels {
                left: vec![-10.0, -11.0, -12.0],
                right: vec![-20.0, -21.0, -22.0],
            }
        }
    }

    fn session_with(state: PersistedState) -> (Session, Arc<MemoryStatePort>) {
        let port = Arc::new(MemoryStatePort::with_state(state));
        let pipeline = LevelPipeline::new(Arc::new(LevelCache::new()), Arc::new(RampAnalyzer));
        let session = Session::open(Box::new(Arc::clone(&port)), pipeline).expect("open");
        (session, port)
    }

    fn state_with(name: &str, entries: &[&str]) -> PersistedState {
        let mut state = PersistedState::default();
        state.playlists.insert(
            name.to_string(),
            entries.iter().map(|entry| entry.to_string()).collect(),
        );
        state
    }

    fn sources(session: &Session) -> Vec<&str> {
        session
            .store()
            .entries()
            .iter()
            .map(|entry| entry.source.as_str())
            .collect()
    }

    #[test]
    fn starts_in_buffer_mode() {
        let (session, _) = session_with(PersistedState::default());
        assert!(session.store().is_buffer());
        assert_eq!(session.cursor().state(), CursorState::Idle);
        assert_eq!(session.meter_levels(), SENTINEL_LEVELS);
    }

    #[test]
    fn open_missing_playlist_is_rejected() {
        let (mut session, _) = session_with(PersistedState::default());
        let mut player = TestPlayer::default();
        let err = session
            .open_playlist("nope", &mut player)
            .expect_err("missing");
        assert_eq!(err, QueueError::PlaylistNotFound(String::from("nope")));
        assert!(session.store().is_buffer());
    }

    #[test]
    fn new_playlist_rejects_collision_and_reserved_names() {
        let (mut session, port) = session_with(state_with("mix", &[]));
        let mut player = TestPlayer::default();

        assert!(matches!(
            session.new_playlist("mix", &mut player),
            Err(QueueError::PlaylistExists(_))
        ));
        assert_eq!(session.status, "Current playlist already exists");
        assert!(matches!(
            session.new_playlist(BUFFER_PLAYLIST, &mut player),
            Err(QueueError::ReservedName(_))
        ));
        assert_eq!(port.save_count(), 0);

        session.new_playlist("road", &mut player).expect("create");
        assert_eq!(session.store().name(), "road");
        assert!(port.stored().expect("saved").playlists.contains_key("road"));
    }

    #[test]
    fn save_flushes_mirror_and_skips_buffer() {
        let (mut session, port) = session_with(state_with("mix", &["A.mp3|"]));
        let mut player = TestPlayer::default();
        session.open_playlist("mix", &mut player).expect("open");
        session.add_sources(vec![String::from("b.mp3")]);
        session.save().expect("save");

        let stored = port.stored().expect("stored");
        assert_eq!(
            stored.playlists.get("mix"),
            Some(&vec![String::from("A.mp3|"), String::from("B.mp3|")])
        );
        assert!(!stored.playlists.contains_key(BUFFER_PLAYLIST));
        assert_eq!(stored.last_playlist.as_deref(), Some("mix"));
    }

    #[test]
    fn buffer_entries_are_never_persisted() {
        let (mut session, port) = session_with(PersistedState::default());
        session.add_sources(vec![String::from("scratch.mp3")]);
        session.save().expect("save");
        assert!(port.stored().expect("stored").playlists.is_empty());
    }

    #[test]
    fn delete_playlist_falls_back_to_buffer() {
        let (mut session, port) = session_with(state_with("mix", &["A.mp3"]));
        let mut player = TestPlayer::default();
        session.open_playlist("mix", &mut player).expect("open");
        session.delete_playlist(&mut player).expect("delete");

        assert!(session.store().is_buffer());
        assert!(!port.stored().expect("stored").playlists.contains_key("mix"));
        assert!(matches!(
            session.delete_playlist(&mut player),
            Err(QueueError::ReservedName(_))
        ));
    }

    #[test]
    fn auto_load_on_open_loads_first_entry_without_playing() {
        let mut state = state_with("mix", &["A.mp3", "B.mp3"]);
        state.auto_load = true;
        let (mut session, _) = session_with(state);
        let mut player = TestPlayer::default();
        session.open_playlist("mix", &mut player).expect("open");

        assert_eq!(player.source, Some(PathBuf::from("A.mp3")));
        assert_eq!(player.plays, 0);
    }

    #[test]
    fn end_of_media_plays_next_with_auto_play() {
        let (mut session, _) = session_with(state_with("mix", &["A.mp3", "B.mp3", "C.mp3"]));
        let mut player = TestPlayer::default();
        session.open_playlist("mix", &mut player).expect("open");
        session.activate_row(0, &mut player).expect("activate");

        session.handle_player_event(PlayerEvent::EndOfMedia, &mut player);
        assert_eq!(session.cursor().current_index(), 1);
        assert_eq!(player.source, Some(PathBuf::from("B.mp3")));
        assert!(!player.paused);
    }

    #[test]
    fn end_of_media_with_repeat_replays_same_track() {
        let (mut session, _) = session_with(state_with("mix", &["A.mp3", "B.mp3"]));
        let mut player = TestPlayer::default();
        session.open_playlist("mix", &mut player).expect("open");
        session.activate_row(1, &mut player).expect("activate");
        session.toggle_repeat();

        session.handle_player_event(PlayerEvent::EndOfMedia, &mut player);
        assert_eq!(session.cursor().current_index(), 1);
        assert_eq!(player.plays, 2);
    }

    #[test]
    fn end_of_media_with_only_auto_load_loads_paused() {
        let (mut session, _) = session_with(state_with("mix", &["A.mp3", "B.mp3"]));
        let mut player = TestPlayer::default();
        session.set_auto_play(false);
        session.set_auto_load(true);
        session.open_playlist("mix", &mut player).expect("open");
        session.activate_row(0, &mut player).expect("activate");
        let plays = player.plays;

        session.handle_player_event(PlayerEvent::EndOfMedia, &mut player);
        assert_eq!(player.source, Some(PathBuf::from("B.mp3")));
        assert_eq!(player.plays, plays);
    }

    #[test]
    fn invalid_media_sets_notice() {
        let (mut session, _) = session_with(state_with("mix", &["broken.mp3"]));
        let mut player = TestPlayer::default();
        session.open_playlist("mix", &mut player).expect("open");
        session.activate_row(0, &mut player).expect("activate");

        assert_eq!(session.status, INVALID_MEDIA_NOTICE);
        assert_eq!(player.plays, 0);
    }

    #[test]
    fn meter_follows_position_of_loaded_source() {
        let (mut session, _) = session_with(state_with("mix", &["A.mp3"]));
        let mut player = TestPlayer::default();
        session.open_playlist("mix", &mut player).expect("open");
        session.activate_row(0, &mut player).expect("activate");
        assert!(session.take_analysis().expect("analysis").join());

        session.handle_player_event(PlayerEvent::PositionChanged(2), &mut player);
        assert_eq!(session.meter_levels(), (-12.0, -22.0));
        session.handle_player_event(PlayerEvent::PositionChanged(3), &mut player);
        assert_eq!(session.meter_levels(), (MIN_LEVEL_DB, MIN_LEVEL_DB));
    }

    #[test]
    fn move_selected_reorders_and_keeps_cursor_valid() {
        let (mut session, _) = session_with(state_with("mix", &["A", "B", "C"]));
        let mut player = TestPlayer::default();
        session.open_playlist("mix", &mut player).expect("open");
        session.selected = 2;
        session.move_selected_up().expect("move");
        assert_eq!(sources(&session), vec!["A", "C", "B"]);
        assert_eq!(session.selected, 1);

        session.remove_rows(&[0, 1, 2]).expect("remove");
        assert_eq!(session.cursor().state(), CursorState::Idle);
        assert_eq!(session.selected, 0);
    }

    #[test]
    fn moving_playing_row_keeps_repeat_on_same_track() {
        let (mut session, _) = session_with(state_with("mix", &["A.mp3", "B.mp3", "C.mp3"]));
        let mut player = TestPlayer::default();
        session.open_playlist("mix", &mut player).expect("open");
        session.activate_row(2, &mut player).expect("activate");
        session.toggle_repeat();

        session.selected = 2;
        session.move_selected_up().expect("move");
        assert_eq!(session.cursor().current_index(), 1);

        session.move_row(0, 2).expect("move");
        assert_eq!(sources(&session), vec!["C.mp3", "B.mp3", "A.mp3"]);
        assert_eq!(session.cursor().current_index(), 0);

        session.handle_player_event(PlayerEvent::EndOfMedia, &mut player);
        assert_eq!(player.source, Some(PathBuf::from("C.mp3")));
    }

    #[test]
    fn drop_of_multi_entry_run_keeps_every_track() {
        let (mut session, _) = session_with(state_with("mix", &["A", "B", "C", "D"]));
        let mut player = TestPlayer::default();
        session.open_playlist("mix", &mut player).expect("open");
        let payload = transfer::encode_rows(session.store(), &[0, 1]).expect("encode");

        assert_eq!(session.drop_payload(&payload, 2).expect("drop"), 2);
        assert_eq!(sources(&session), vec!["C", "D", "A", "B"]);
    }

    #[test]
    fn sources_with_separator_are_skipped() {
        let (mut session, _) = session_with(state_with("mix", &[]));
        let mut player = TestPlayer::default();
        session.open_playlist("mix", &mut player).expect("open");
        let added = session.add_sources(vec![
            String::from("/music/a.mp3"),
            String::from("/music/b|c.mp3"),
        ]);
        assert_eq!(added, 1);
        assert_eq!(sources(&session), vec!["/music/a.mp3"]);
        assert_eq!(session.status, "Added 1 tracks, skipped 1 with '|' in the path");
    }

    #[test]
    fn malformed_drop_reports_status() {
        let (mut session, _) = session_with(state_with("mix", &["A"]));
        let mut player = TestPlayer::default();
        session.open_playlist("mix", &mut player).expect("open");
        assert!(session.drop_payload(b"", 0).is_err());
        assert!(session.status.starts_with("Malformed transfer payload"));
        assert_eq!(sources(&session), vec!["A"]);
    }

    #[test]
    fn volume_steps_by_four_and_clamps() {
        let (mut session, _) = session_with(PersistedState::default());
        let mut player = TestPlayer::default();
        session.volume_up(&mut player);
        assert_eq!(session.volume(), 54);
        assert!((player.volume - 0.54).abs() < f32::EPSILON);
        session.set_volume(98, &mut player);
        session.volume_up(&mut player);
        assert_eq!(session.volume(), 100);
    }

    #[test]
    fn seek_is_clamped_at_track_start() {
        let (mut session, _) = session_with(state_with("mix", &["A.mp3"]));
        let mut player = TestPlayer::default();
        session.seek_by(5_000, &mut player);
        assert_eq!(session.position_ms, 0);

        session.open_playlist("mix", &mut player).expect("open");
        session.activate_row(0, &mut player).expect("activate");
        session.seek_by(5_000, &mut player);
        assert_eq!(session.position_ms, 5_000);
        session.seek_by(-9_000, &mut player);
        assert_eq!(session.position_ms, 0);
    }

    #[test]
    fn startup_playlist_requires_known_name() {
        let mut state = state_with("mix", &[]);
        state.last_playlist = Some(String::from("mix"));
        let (session, _) = session_with(state);
        assert_eq!(session.startup_playlist().as_deref(), Some("mix"));

        let mut state = PersistedState::default();
        state.last_playlist = Some(String::from("gone"));
        let (session, _) = session_with(state);
        assert_eq!(session.startup_playlist(), None);
    }
}
