//! Per-millisecond stereo loudness extraction
//!
//! Audio is decoded once, decimated to roughly one frame per millisecond by
//! keeping every `round(rate / 1000)`-th frame (no interpolation), and each
//! kept amplitude is converted to decibels. Anything that goes wrong while
//! decoding yields [`StereoLevels::silent`] instead of an error.

use crate::cache::LevelCache;
use crate::model::locator_path;
use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::fs::File;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, warn};

/// Loudness floor; silence and missing data are reported at this level.
pub const MIN_LEVEL_DB: f32 = -96.0;

#[derive(Debug, Clone, PartialEq)]
pub struct StereoLevels {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl StereoLevels {
    /// One floor-level sample per channel.
    pub fn silent() -> Self {
        Self {
            left: vec![MIN_LEVEL_DB],
            right: vec![MIN_LEVEL_DB],
        }
    }

    pub fn len(&self) -> usize {
        self.left.len().min(self.right.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_silent(&self) -> bool {
        self.left
            .iter()
            .chain(&self.right)
            .all(|level| *level <= MIN_LEVEL_DB)
    }
}

pub trait Analyzer: Send + Sync {
    fn analyze(&self, source: &str) -> StereoLevels;
}

/// Decodes with symphonia.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaAnalyzer;

impl Analyzer for SymphoniaAnalyzer {
    fn analyze(&self, source: &str) -> StereoLevels {
        let path = locator_path(source);
        match decode_levels(&path) {
            Ok(levels) => {
                debug!(source, samples = levels.len(), "levels decoded");
                levels
            }
            Err(err) => {
                warn!(source, "level analysis failed: {err:#}");
                StereoLevels::silent()
            }
        }
    }
}

pub fn decimation_stride(sample_rate: u32) -> usize {
    (f64::from(sample_rate) / 1_000.0).round().max(1.0) as usize
}

pub fn amplitude_to_db(amplitude: f32) -> f32 {
    let magnitude = amplitude.abs();
    if !magnitude.is_finite() || magnitude <= 0.0 {
        return MIN_LEVEL_DB;
    }
    (20.0 * magnitude.log10()).clamp(MIN_LEVEL_DB, 0.0)
}

fn decode_levels(path: &Path) -> Result<StereoLevels> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let stream = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(OsStr::to_str) {
        hint.with_extension(extension);
    }

    let probed = get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("unsupported container {}", path.display()))?;
    let mut format = probed.format;

    let track = format.default_track().context("no default audio track")?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("unknown sample rate")?;
    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("unsupported codec")?;

    let mut decimator = Decimator::new(decimation_stride(sample_rate));
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(err).context("failed to read packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) | Err(SymphoniaError::IoError(_)) => continue,
            Err(err) => return Err(err).context("failed to decode packet"),
        };
        let spec = *decoded.spec();
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        decimator.push_interleaved(buffer.samples(), spec.channels.count());
    }

    Ok(decimator.finish())
}

/// Keeps every `stride`-th frame of an interleaved stream.
#[derive(Debug)]
struct Decimator {
    stride: usize,
    frame_index: usize,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl Decimator {
    fn new(stride: usize) -> Self {
        Self {
            stride: stride.max(1),
            frame_index: 0,
            left: Vec::new(),
            right: Vec::new(),
        }
    }

    fn push_interleaved(&mut self, samples: &[f32], channels: usize) {
        let channels = channels.max(1);
        for frame in samples.chunks_exact(channels) {
            if self.frame_index.is_multiple_of(self.stride) {
                let left = frame[0];
                let right = frame.get(1).copied().unwrap_or(left);
                self.left.push(amplitude_to_db(left));
                self.right.push(amplitude_to_db(right));
            }
            self.frame_index += 1;
        }
    }

    fn finish(self) -> StereoLevels {
        let levels = StereoLevels {
            left: self.left,
            right: self.right,
        };
        if levels.is_empty() || levels.is_silent() {
            return StereoLevels::silent();
        }
        levels
    }
}

/// Runs analyses on worker threads and publishes results to a [`LevelCache`].
#[derive(Clone)]
pub struct LevelPipeline {
    cache: Arc<LevelCache>,
    analyzer: Arc<dyn Analyzer>,
}

impl LevelPipeline {
    pub fn new(cache: Arc<LevelCache>, analyzer: Arc<dyn Analyzer>) -> Self {
        Self { cache, analyzer }
    }

    pub fn with_symphonia(cache: Arc<LevelCache>) -> Self {
        Self::new(cache, Arc::new(SymphoniaAnalyzer))
    }

    pub fn cache(&self) -> &Arc<LevelCache> {
        &self.cache
    }

    /// Starts analysis unless `source` is already the active source.
    pub fn ensure(&self, source: &str) -> Option<AnalysisHandle> {
        if self.cache.active_source().as_deref() == Some(source) {
            return None;
        }
        Some(self.request(source))
    }

    /// Starts analysis of `source`, superseding any analysis in flight.
    pub fn request(&self, source: &str) -> AnalysisHandle {
        let epoch = self.cache.begin(source);
        let cache = Arc::clone(&self.cache);
        let analyzer = Arc::clone(&self.analyzer);
        let owned_source = source.to_string();
        debug!(source, epoch, "level analysis requested");

        let spawned = thread::Builder::new()
            .name(format!("levels-{epoch}"))
            .spawn(move || {
                let levels = panic::catch_unwind(AssertUnwindSafe(|| {
                    analyzer.analyze(&owned_source)
                }))
                .unwrap_or_else(|_| {
                    warn!(source = %owned_source, "level analysis panicked");
                    StereoLevels::silent()
                });
                cache.complete(epoch, &owned_source, levels)
            });

        match spawned {
            Ok(worker) => AnalysisHandle {
                epoch,
                worker: Some(worker),
            },
            Err(err) => {
                warn!(source, "failed to spawn level worker: {err}");
                self.cache.complete(epoch, source, StereoLevels::silent());
                AnalysisHandle {
                    epoch,
                    worker: None,
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct AnalysisHandle {
    epoch: u64,
    worker: Option<JoinHandle<bool>>,
}

impl AnalysisHandle {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Waits for the worker; `true` if its result reached the cache.
    pub fn join(self) -> bool {
        self.worker
            .map(|worker| worker.join().unwrap_or(false))
            .unwrap_or(false)
    }
}
