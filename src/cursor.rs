//! Current-track pointer and the end-of-media policy

use crate::error::{QueueError, Result};
use std::sync::mpsc::{self, Receiver, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Idle,
    Positioned(usize),
}

/// Settings consulted when the player reports end of media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AutoAdvance {
    pub auto_play: bool,
    pub auto_load: bool,
}

/// What the session should do with the player after end of media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Start the current track again.
    Replay,
    /// Load and start the track at this index.
    Play(usize),
    /// Load the track at this index without starting it.
    Load(usize),
    /// Leave the cursor where it is; playback ends.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorEvent {
    IndexChanged(usize),
    RepeatChanged(bool),
}

#[derive(Debug, Default)]
pub struct PlaybackCursor {
    current: Option<usize>,
    repeat_enabled: bool,
    listeners: Vec<Sender<CursorEvent>>,
}

impl PlaybackCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CursorState {
        match self.current {
            Some(index) => CursorState::Positioned(index),
            None => CursorState::Idle,
        }
    }

    /// Current row, `0` while idle.
    pub fn current_index(&self) -> usize {
        self.current.unwrap_or(0)
    }

    pub fn repeat_enabled(&self) -> bool {
        self.repeat_enabled
    }

    pub fn toggle_repeat(&mut self) -> bool {
        self.repeat_enabled = !self.repeat_enabled;
        self.notify(CursorEvent::RepeatChanged(self.repeat_enabled));
        self.repeat_enabled
    }

    pub fn subscribe(&mut self) -> Receiver<CursorEvent> {
        let (tx, rx) = mpsc::channel();
        self.listeners.push(tx);
        rx
    }

    /// Re-clamps the cursor against a playlist of `len` rows.
    pub fn resync(&mut self, len: usize) {
        let next = match (self.current, len) {
            (_, 0) => None,
            (Some(index), len) => Some(index.min(len - 1)),
            (None, _) => Some(0),
        };
        self.set(next);
    }

    /// Keeps the cursor on the same track after the row at `from` was moved
    /// and landed at `to`.
    pub fn follow_move(&mut self, from: usize, to: usize) {
        let Some(current) = self.current else {
            return;
        };
        let next = if current == from {
            to
        } else {
            let shifted = if current > from { current - 1 } else { current };
            if shifted >= to { shifted + 1 } else { shifted }
        };
        self.set(Some(next));
    }

    pub fn next(&mut self, len: usize) -> Option<usize> {
        self.step(len, 1)
    }

    pub fn previous(&mut self, len: usize) -> Option<usize> {
        self.step(len, len.saturating_sub(1))
    }

    /// Direct activation of a row, independent of the advance policy.
    pub fn jump_to(&mut self, index: usize, len: usize) -> Result<usize> {
        if index >= len {
            return Err(QueueError::IndexOutOfRange { index, len });
        }
        self.set(Some(index));
        Ok(index)
    }

    pub fn on_end_of_media(&mut self, len: usize, policy: AutoAdvance) -> Advance {
        if self.repeat_enabled {
            return Advance::Replay;
        }
        if len == 0 {
            self.set(None);
            return Advance::Stop;
        }
        if policy.auto_play {
            return self.next(len).map_or(Advance::Stop, Advance::Play);
        }
        if policy.auto_load {
            return self.next(len).map_or(Advance::Stop, Advance::Load);
        }
        Advance::Stop
    }

    fn step(&mut self, len: usize, offset: usize) -> Option<usize> {
        if len == 0 {
            self.set(None);
            return None;
        }
        let current = self.current.unwrap_or(0).min(len - 1);
        let next = (current + offset) % len;
        self.set(Some(next));
        Some(next)
    }

    fn set(&mut self, next: Option<usize>) {
        let changed = self.current != next;
        self.current = next;
        if changed {
            self.notify(CursorEvent::IndexChanged(next.unwrap_or(0)));
        }
    }

    fn notify(&mut self, event: CursorEvent) {
        self.listeners.retain(|listener| listener.send(event).is_ok());
    }
}
