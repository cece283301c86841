//! Error types for playlist, transfer and cursor operations

use thiserror::Error;

/// Structural and persistence-conflict errors raised by the queue engine.
///
/// Every operation returning one of these leaves its target untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Row range does not fit inside the playlist
    #[error("Index out of range: {index} (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Drag payload could not be decoded
    #[error("Malformed transfer payload: {0}")]
    MalformedPayload(String),

    /// A playlist with this name is already stored
    #[error("Playlist already exists: {0}")]
    PlaylistExists(String),

    /// No stored playlist has this name
    #[error("Playlist not found: {0}")]
    PlaylistNotFound(String),

    /// The scratch playlist name cannot be created, saved or deleted
    #[error("Reserved playlist name: {0}")]
    ReservedName(String),
}

/// Result type for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;
