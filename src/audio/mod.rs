use anyhow::{Context, Result};
use rodio::Source;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
#[cfg(unix)]
use std::ffi::CString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const MAX_VOLUME: f32 = 1.0;

/// Boundary to the component that actually renders audio.
///
/// `set_source` loads a track paused at the start; `play` starts it.
pub trait MediaPlayer {
    fn set_source(&mut self, path: &Path) -> Result<()>;
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn set_position(&mut self, position: Duration) -> Result<()>;
    fn position(&self) -> Option<Duration>;
    fn duration(&self) -> Option<Duration>;
    fn is_paused(&self) -> bool;
    fn is_finished(&self) -> bool;
    fn current_source(&self) -> Option<&Path>;
    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    SourceChanged(Option<PathBuf>),
    PositionChanged(u64),
    DurationChanged(u64),
    EndOfMedia,
    InvalidMedia(PathBuf),
}

/// Turns polled player state into change events.
#[derive(Debug, Default)]
pub struct PlayerWatch {
    source: Option<PathBuf>,
    position_ms: Option<u64>,
    duration_ms: Option<u64>,
    finished: bool,
}

impl PlayerWatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll(&mut self, player: &dyn MediaPlayer) -> Vec<PlayerEvent> {
        let mut events = Vec::new();

        let source = player.current_source().map(Path::to_path_buf);
        if source != self.source {
            self.source = source.clone();
            self.position_ms = None;
            self.duration_ms = None;
            self.finished = false;
            events.push(PlayerEvent::SourceChanged(source));
        }

        let duration_ms = player.duration().map(duration_ms);
        if duration_ms != self.duration_ms {
            self.duration_ms = duration_ms;
            if let Some(duration) = duration_ms {
                events.push(PlayerEvent::DurationChanged(duration));
            }
        }

        let position_ms = player.position().map(self::duration_ms);
        if position_ms != self.position_ms {
            self.position_ms = position_ms;
            if let Some(position) = position_ms {
                events.push(PlayerEvent::PositionChanged(position));
            }
        }

        let finished = player.is_finished();
        if finished && !self.finished {
            events.push(PlayerEvent::EndOfMedia);
        }
        self.finished = finished;

        events
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub struct RodioPlayer {
    stream: OutputStream,
    sink: Sink,
    current: Option<PathBuf>,
    track_duration: Option<Duration>,
    volume: f32,
}

impl RodioPlayer {
    pub fn new() -> Result<Self> {
        let mut stream = with_silenced_stderr(|| {
            OutputStreamBuilder::from_default_device()
                .context("failed to open default system output stream")?
                .with_error_callback(|_| {})
                .open_stream_or_fallback()
                .context("failed to start default output stream")
        })?;
        stream.log_on_drop(false);
        let sink = Sink::connect_new(stream.mixer());

        Ok(Self {
            stream,
            sink,
            current: None,
            track_duration: None,
            volume: 0.5,
        })
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        self.sink.stop();
        self.sink = Sink::connect_new(self.stream.mixer());
        self.sink.pause();
        self.sink.set_volume(self.volume);

        let file =
            File::open(path).with_context(|| format!("failed to open track {}", path.display()))?;
        let source = Decoder::try_from(file)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        self.track_duration = source.total_duration();
        self.sink.append(source);
        self.current = Some(path.to_path_buf());
        Ok(())
    }
}

impl MediaPlayer for RodioPlayer {
    fn set_source(&mut self, path: &Path) -> Result<()> {
        if let Err(err) = self.load(path) {
            self.current = None;
            self.track_duration = None;
            return Err(err);
        }
        Ok(())
    }

    fn play(&mut self) {
        self.sink.play();
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn stop(&mut self) {
        // Rewinds to the start and keeps the source loaded.
        let Some(path) = self.current.clone() else {
            return;
        };
        if self.load(&path).is_err() {
            self.sink.stop();
            self.current = None;
            self.track_duration = None;
        }
    }

    fn set_position(&mut self, position: Duration) -> Result<()> {
        if self.current.is_none() {
            return Err(anyhow::anyhow!("no active track"));
        }
        self.sink
            .try_seek(position)
            .map_err(|err| anyhow::anyhow!("failed to seek current track: {err:?}"))
    }

    fn position(&self) -> Option<Duration> {
        self.current.as_ref()?;
        Some(self.sink.get_pos())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }

    fn is_finished(&self) -> bool {
        self.current.is_some() && !self.sink.is_paused() && self.sink.empty()
    }

    fn current_source(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, MAX_VOLUME);
        self.sink.set_volume(self.volume);
    }
}

#[cfg(unix)]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    // ALSA and JACK probing write straight to fd 2 and would tear the TUI.
    let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
    if saved < 0 {
        return operation();
    }

    let devnull = CString::new("/dev/null")
        .ok()
        .map(|path| unsafe { libc::open(path.as_ptr(), libc::O_WRONLY) })
        .unwrap_or(-1);

    if devnull >= 0 {
        unsafe {
            libc::dup2(devnull, libc::STDERR_FILENO);
            libc::close(devnull);
        }
    }

    let result = operation();

    unsafe {
        libc::dup2(saved, libc::STDERR_FILENO);
        libc::close(saved);
    }

    result
}

#[cfg(not(unix))]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    operation()
}

/// Clock-only player for machines without an output device.
pub struct NullPlayer {
    paused: bool,
    current: Option<PathBuf>,
    volume: f32,
    started_at: Option<Instant>,
    position_offset: Duration,
    track_duration: Option<Duration>,
}

impl NullPlayer {
    pub fn new() -> Self {
        Self {
            paused: true,
            current: None,
            volume: 0.5,
            started_at: None,
            position_offset: Duration::ZERO,
            track_duration: None,
        }
    }

    fn estimate_duration(path: &Path) -> Option<Duration> {
        let file = File::open(path).ok()?;
        let source = Decoder::try_from(file).ok()?;
        source
            .total_duration()
            .filter(|duration| !duration.is_zero())
    }

    fn current_position(&self) -> Duration {
        let mut position = self.position_offset;
        if !self.paused
            && self.current.is_some()
            && let Some(started_at) = self.started_at
        {
            position = position.saturating_add(started_at.elapsed());
        }
        if let Some(duration) = self.track_duration {
            return position.min(duration);
        }
        position
    }
}

impl Default for NullPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaPlayer for NullPlayer {
    fn set_source(&mut self, path: &Path) -> Result<()> {
        self.paused = true;
        self.current = Some(path.to_path_buf());
        self.started_at = None;
        self.position_offset = Duration::ZERO;
        self.track_duration = Self::estimate_duration(path);
        Ok(())
    }

    fn play(&mut self) {
        if self.current.is_some() && self.paused {
            self.started_at = Some(Instant::now());
        }
        self.paused = false;
    }

    fn pause(&mut self) {
        self.position_offset = self.current_position();
        self.started_at = None;
        self.paused = true;
    }

    fn stop(&mut self) {
        self.paused = true;
        self.started_at = None;
        self.position_offset = Duration::ZERO;
    }

    fn set_position(&mut self, position: Duration) -> Result<()> {
        if self.current.is_none() {
            return Err(anyhow::anyhow!("no active track"));
        }

        self.position_offset = self
            .track_duration
            .map_or(position, |duration| position.min(duration));
        self.started_at = if self.paused {
            None
        } else {
            Some(Instant::now())
        };
        Ok(())
    }

    fn position(&self) -> Option<Duration> {
        self.current.as_ref()?;
        Some(self.current_position())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn is_finished(&self) -> bool {
        let Some(duration) = self.track_duration else {
            return false;
        };
        self.current.is_some() && !self.paused && self.current_position() >= duration
    }

    fn current_source(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, MAX_VOLUME);
    }
}

#[cfg(test)]
mod tests {
    use super::{MediaPlayer, NullPlayer, PlayerEvent, PlayerWatch};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    fn write_test_wav(path: &Path, duration_ms: u32) {
        let sample_rate: u32 = 44_100;
        let channels: u16 = 1;
        let bits_per_sample: u16 = 16;
        let bytes_per_sample = u32::from(bits_per_sample / 8);
        let total_samples = (u64::from(sample_rate) * u64::from(duration_ms) / 1_000) as u32;
        let data_size = total_samples * u32::from(channels) * bytes_per_sample;
        let byte_rate = sample_rate * u32::from(channels) * bytes_per_sample;
        let block_align = channels * (bits_per_sample / 8);

        let mut bytes = Vec::with_capacity((44_u32 + data_size) as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36_u32 + data_size).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16_u32.to_le_bytes());
        bytes.extend_from_slice(&1_u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&byte_rate.to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&bits_per_sample.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_size.to_le_bytes());
        bytes.resize((44_u32 + data_size) as usize, 0_u8);

        fs::write(path, bytes).expect("wav fixture should be written");
    }

    #[test]
    fn null_player_loads_paused_and_advances_after_play() {
        let mut player = NullPlayer::new();
        player
            .set_source(Path::new("nonexistent-track.flac"))
            .expect("null mode accepts any source");
        assert!(player.is_paused());
        let loaded = player.position().expect("position");
        thread::sleep(Duration::from_millis(20));
        assert_eq!(player.position(), Some(loaded));

        player.play();
        thread::sleep(Duration::from_millis(20));
        assert!(player.position().expect("position") > loaded);
    }

    #[test]
    fn null_player_stop_rewinds_and_keeps_source() {
        let mut player = NullPlayer::new();
        player
            .set_source(Path::new("nonexistent-track.flac"))
            .expect("set source");
        player.play();
        player
            .set_position(Duration::from_secs(12))
            .expect("seek should succeed");
        assert!(player.position().expect("position") >= Duration::from_secs(12));

        player.stop();
        assert_eq!(player.position(), Some(Duration::ZERO));
        assert!(player.is_paused());
        assert!(player.current_source().is_some());
    }

    #[test]
    fn null_player_finishes_when_known_duration_elapses() {
        let dir = tempdir().expect("tempdir");
        let track = dir.path().join("fixture.wav");
        write_test_wav(&track, 80);

        let mut player = NullPlayer::new();
        player.set_source(&track).expect("set source");
        let duration = player.duration().expect("duration should be detected");
        assert!(duration >= Duration::from_millis(70));

        player.play();
        thread::sleep(Duration::from_millis(120));
        assert!(player.is_finished(), "known-duration playback should finish");
    }

    #[test]
    fn null_player_unknown_duration_does_not_finish() {
        let mut player = NullPlayer::new();
        player
            .set_source(Path::new("nonexistent-track.flac"))
            .expect("set source");
        player.play();
        thread::sleep(Duration::from_millis(40));
        assert!(!player.is_finished());
    }

    #[test]
    fn watch_reports_source_duration_and_single_end_of_media() {
        let dir = tempdir().expect("tempdir");
        let track = dir.path().join("fixture.wav");
        write_test_wav(&track, 40);

        let mut player = NullPlayer::new();
        let mut watch = PlayerWatch::new();
        assert!(watch.poll(&player).is_empty());

        player.set_source(&track).expect("set source");
        let events = watch.poll(&player);
        assert_eq!(events[0], PlayerEvent::SourceChanged(Some(PathBuf::from(&track))));
        assert!(
            events
                .iter()
                .any(|event| matches!(event, PlayerEvent::DurationChanged(ms) if (35..=45).contains(ms)))
        );
        assert!(events.contains(&PlayerEvent::PositionChanged(0)));

        player.play();
        thread::sleep(Duration::from_millis(80));
        let events = watch.poll(&player);
        assert!(events.contains(&PlayerEvent::EndOfMedia));
        assert!(!watch.poll(&player).contains(&PlayerEvent::EndOfMedia));
    }
}
