//! Latest-source level store with epoch-checked publication

use crate::waveform::{MIN_LEVEL_DB, StereoLevels};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::debug;

/// Level pair returned whenever no valid data exists.
pub const SENTINEL_LEVELS: (f32, f32) = (MIN_LEVEL_DB, MIN_LEVEL_DB);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelEvent {
    Attached(String),
    Discarded(String),
}

#[derive(Debug, Default)]
struct CacheState {
    active_epoch: u64,
    active_source: Option<String>,
    owner: Option<(String, StereoLevels)>,
}

/// Holds the levels of one source at a time.
///
/// All reads and writes go through one lock, so a query sees either the
/// state before a swap or the state after it.
#[derive(Debug, Default)]
pub struct LevelCache {
    state: RwLock<CacheState>,
    listeners: Mutex<Vec<Sender<LevelEvent>>>,
}

impl LevelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<LevelEvent> {
        let (tx, rx) = mpsc::channel();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Marks `source` as the loaded source and drops the current levels.
    /// Returns the epoch a completing analysis must present.
    pub fn begin(&self, source: &str) -> u64 {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.active_epoch += 1;
        state.active_source = Some(source.to_string());
        state.owner = None;
        state.active_epoch
    }

    /// Replaces owner and levels in one step.
    pub fn attach(&self, source: &str, levels: StereoLevels) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.owner = Some((source.to_string(), levels));
        }
        self.notify(LevelEvent::Attached(source.to_string()));
    }

    /// Attaches `levels` only if `epoch` is still current and `source` is
    /// still the loaded source.
    pub fn complete(&self, epoch: u64, source: &str, levels: StereoLevels) -> bool {
        let applied = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let current = state.active_epoch == epoch
                && state.active_source.as_deref() == Some(source);
            if current {
                state.owner = Some((source.to_string(), levels));
            }
            current
        };

        if applied {
            debug!(source, epoch, "levels attached");
            self.notify(LevelEvent::Attached(source.to_string()));
        } else {
            debug!(source, epoch, "stale levels discarded");
            self.notify(LevelEvent::Discarded(source.to_string()));
        }
        applied
    }

    pub fn query(&self, source: &str, position_ms: u64) -> (f32, f32) {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let Some((owner, levels)) = state.owner.as_ref() else {
            return SENTINEL_LEVELS;
        };
        if owner != source {
            return SENTINEL_LEVELS;
        }
        let Ok(index) = usize::try_from(position_ms) else {
            return SENTINEL_LEVELS;
        };
        match (levels.left.get(index), levels.right.get(index)) {
            (Some(left), Some(right)) => (*left, *right),
            _ => SENTINEL_LEVELS,
        }
    }

    pub fn owner_source(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .owner
            .as_ref()
            .map(|(source, _)| source.clone())
    }

    pub fn active_source(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active_source
            .clone()
    }

    pub fn active_epoch(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active_epoch
    }

    fn notify(&self, event: LevelEvent) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|listener| listener.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn ramp(len: usize) -> StereoLevels {
        StereoLevels {
            left: (0..len).map(|n| -(n as f32)).collect(),
            right: (0..len).map(|n| -(n as f32) - 0.5).collect(),
        }
    }

    #[test]
    fn query_indexes_by_millisecond() {
        let cache = LevelCache::new();
        cache.attach("a.mp3", ramp(10));
        assert_eq!(cache.query("a.mp3", 3), (-3.0, -3.5));
        assert_eq!(cache.query("a.mp3", 10), SENTINEL_LEVELS);
        assert_eq!(cache.query("a.mp3", u64::MAX), SENTINEL_LEVELS);
    }

    #[test]
    fn other_source_never_sees_cached_levels() {
        let cache = LevelCache::new();
        cache.attach("a.mp3", ramp(50));
        for position in 0..60 {
            assert_eq!(cache.query("b.mp3", position), SENTINEL_LEVELS);
        }
    }

    #[test]
    fn empty_cache_returns_sentinel() {
        assert_eq!(LevelCache::new().query("a.mp3", 0), SENTINEL_LEVELS);
    }

    #[test]
    fn begin_invalidates_current_levels() {
        let cache = LevelCache::new();
        cache.attach("a.mp3", ramp(5));
        cache.begin("b.mp3");
        assert_eq!(cache.owner_source(), None);
        assert_eq!(cache.query("a.mp3", 1), SENTINEL_LEVELS);
        assert_eq!(cache.active_source().as_deref(), Some("b.mp3"));
    }

    #[test]
    fn completion_requires_current_epoch_and_source() {
        let cache = LevelCache::new();
        let old = cache.begin("a.mp3");
        let new = cache.begin("b.mp3");

        assert!(!cache.complete(old, "a.mp3", ramp(3)));
        assert!(!cache.complete(new, "a.mp3", ramp(3)));
        assert_eq!(cache.owner_source(), None);

        assert!(cache.complete(new, "b.mp3", ramp(3)));
        assert_eq!(cache.owner_source().as_deref(), Some("b.mp3"));
        assert_eq!(cache.active_epoch(), new);
    }

    #[test]
    fn subscribers_hear_attach_and_discard() {
        let cache = LevelCache::new();
        let rx = cache.subscribe();
        let stale = cache.begin("a.mp3");
        let live = cache.begin("b.mp3");
        cache.complete(stale, "a.mp3", ramp(1));
        cache.complete(live, "b.mp3", ramp(1));

        let events: Vec<LevelEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                LevelEvent::Discarded(String::from("a.mp3")),
                LevelEvent::Attached(String::from("b.mp3")),
            ]
        );
    }

    #[test]
    fn concurrent_queries_never_mix_sources() {
        let cache = Arc::new(LevelCache::new());
        cache.attach("a.mp3", StereoLevels {
            left: vec![-1.0; 100],
            right: vec![-1.0; 100],
        });

        let reader = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..2_000 {
                    let (left, right) = cache.query("a.mp3", 10);
                    assert!(
                        (left, right) == (-1.0, -1.0) || (left, right) == SENTINEL_LEVELS,
                        "mixed levels: {left} {right}"
                    );
                }
            })
        };

        for round in 0..200 {
            let source = if round % 2 == 0 { "b.mp3" } else { "a.mp3" };
            let fill = if round % 2 == 0 { -2.0 } else { -1.0 };
            cache.attach(source, StereoLevels {
                left: vec![fill; 100],
                right: vec![fill; 100],
            });
        }

        reader.join().expect("reader");
    }
}
