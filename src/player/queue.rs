//! Queue navigation decisions.
//!
//! These functions only look at the playlist, the current track, and the
//! repeat mode; the engine carries out whatever they return.

use crate::model::{RepeatMode, Track};

/// What the engine should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Load and play the playlist entry at this index
    Play(usize),
    /// Seek the current sound to 0 and resume it
    Restart,
    /// Release the sound; nothing is current afterwards
    Stop,
    /// Do nothing
    Stay,
}

fn position_of(playlist: &[Track], current: &Track) -> Option<usize> {
    playlist.iter().position(|t| t.id == current.id)
}

/// "Next" pressed (or a finished track with repeat off).
///
/// A current track missing from the playlist moves to the first entry.
pub fn next_transition(playlist: &[Track], current: Option<&Track>) -> Transition {
    let Some(current) = current else {
        return Transition::Stay;
    };
    if playlist.is_empty() {
        return Transition::Stay;
    }
    match position_of(playlist, current) {
        Some(i) if i + 1 < playlist.len() => Transition::Play(i + 1),
        Some(_) => Transition::Stop,
        None => Transition::Play(0),
    }
}

/// "Previous" pressed.
///
/// `elapsed_ms` is `None` when the sound's status could not be read; then
/// the predecessor is played if there is one.
pub fn previous_transition(
    playlist: &[Track],
    current: Option<&Track>,
    elapsed_ms: Option<u64>,
    restart_threshold_ms: u64,
) -> Transition {
    let Some(current) = current else {
        return Transition::Stay;
    };
    let predecessor = position_of(playlist, current)
        .filter(|&i| i > 0)
        .map(|i| i - 1);

    match (elapsed_ms, predecessor) {
        (Some(elapsed), _) if elapsed >= restart_threshold_ms => Transition::Restart,
        (Some(_), Some(i)) => Transition::Play(i),
        (Some(_), None) => Transition::Restart,
        (None, Some(i)) => Transition::Play(i),
        (None, None) => Transition::Stay,
    }
}

/// The current sound reported it finished playing.
pub fn completion_transition(
    repeat: RepeatMode,
    playlist: &[Track],
    current: Option<&Track>,
) -> Transition {
    match repeat {
        RepeatMode::Track => Transition::Restart,
        _ if current.is_none() => Transition::Stay,
        _ if playlist.is_empty() => Transition::Stop,
        RepeatMode::Queue => match current.and_then(|c| position_of(playlist, c)) {
            Some(i) if i + 1 == playlist.len() => Transition::Play(0),
            _ => next_transition(playlist, current),
        },
        RepeatMode::Off => next_transition(playlist, current),
    }
}
