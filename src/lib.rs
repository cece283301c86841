pub mod app;
pub mod audio;
pub mod cache;
pub mod config;
pub mod cursor;
pub mod error;
pub mod library;
pub mod model;
pub mod playlist;
pub mod session;
pub mod transfer;
pub mod ui;
pub mod waveform;
