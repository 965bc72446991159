//! Published playback state.

use std::sync::Arc;

use crate::model::{RepeatMode, Track, format_duration};

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    /// No track loaded
    #[default]
    Idle,
    /// A sound is being created
    Loading,
    Playing,
    Paused,
    /// The queue ran out with repeat off
    Ended,
}

/// Snapshot the engine publishes after every transition.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    pub current_track: Option<Track>,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub repeat_mode: RepeatMode,
    pub playlist: Arc<[Track]>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            status: PlaybackStatus::Idle,
            current_track: None,
            position_ms: 0,
            duration_ms: 0,
            repeat_mode: RepeatMode::Off,
            playlist: Arc::from(Vec::new()),
        }
    }
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    /// Get position as a fraction (0.0 - 1.0).
    pub fn position_fraction(&self) -> f32 {
        if self.duration_ms == 0 {
            0.0
        } else {
            (self.position_ms as f32 / self.duration_ms as f32).min(1.0)
        }
    }

    /// Format position as M:SS.
    pub fn position_str(&self) -> String {
        format_duration(Some(self.position_ms))
    }

    /// Format duration as M:SS.
    pub fn duration_str(&self) -> String {
        format_duration(Some(self.duration_ms))
    }

    /// Back to idle with nothing loaded. Playlist and repeat mode survive.
    pub(crate) fn reset(&mut self, status: PlaybackStatus) {
        self.status = status;
        self.current_track = None;
        self.position_ms = 0;
        self.duration_ms = 0;
    }
}
