//! Playback engine: one sound at a time, transport controls, repeat policy.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │               PlaybackEngine (cloneable handle)              │
//! │   transport calls ──► slot mutex ──► Sound (platform audio)  │
//! └───────┬───────────────────────────────────────▲──────────────┘
//!         │ watch channel                         │ status listener
//!         ▼                                       │ (generation id)
//! ┌──────────────────┐                  ┌─────────┴──────────────┐
//! │ Presentation     │                  │ completion worker      │
//! │ (subscribers)    │                  │ progress ticker        │
//! └──────────────────┘                  └────────────────────────┘
//! ```
//!
//! Every sound gets a generation number when it is created. Completion
//! signals and progress ticks carry it, and anything tagged with a stale
//! generation is dropped; the check is repeated under the slot lock, since a
//! newer load may have replaced the sound while the signal waited for it.
//! Background tasks only hold weak references, so dropping the last engine
//! handle stops them and hands the loaded sound to the runtime to unload.

mod queue;
pub mod sound;
mod state;

pub use queue::{Transition, completion_transition, next_transition, previous_transition};
pub use sound::{LoadOptions, Sound, SoundBackend, SoundError, SoundStatus, StatusListener};
pub use state::{PlaybackState, PlaybackStatus};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::PlaybackConfig;
use crate::model::{RepeatMode, Track};

/// Player errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlayerError {
    /// The track has no URI to load
    #[error("Track {0} has no playable source")]
    MissingSource(String),

    /// Creating or starting the sound failed; the engine is back to idle
    #[error("Failed to load sound: {0}")]
    ResourceLoad(#[source] SoundError),

    /// A transport call on the loaded sound failed; state is unchanged
    #[error("Audio service rejected the request: {0}")]
    Transport(#[source] SoundError),

    #[error("Playback engine has been shut down")]
    ShutDown,
}

struct ActiveSound {
    sound: Box<dyn Sound>,
    generation: u64,
}

struct EngineInner {
    backend: Arc<dyn SoundBackend>,
    settings: PlaybackConfig,
    state_tx: watch::Sender<PlaybackState>,
    /// The one loaded sound. Every resource mutation holds this lock.
    slot: AsyncMutex<Option<ActiveSound>>,
    generation: AtomicU64,
    loading: AtomicBool,
    mounted: AtomicBool,
    progress: Mutex<Option<JoinHandle<()>>>,
    completions: mpsc::UnboundedSender<u64>,
    completion_task: Mutex<Option<JoinHandle<()>>>,
}

impl EngineInner {
    fn is_current(&self, generation: u64) -> bool {
        self.mounted.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    fn publish(&self, update: impl FnOnce(&mut PlaybackState)) {
        self.state_tx.send_modify(update);
    }

    fn stop_progress(&self) {
        if let Some(task) = self.progress.lock().take() {
            task.abort();
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Some(task) = self.progress.get_mut().take() {
            task.abort();
        }
        if let Some(task) = self.completion_task.get_mut().take() {
            task.abort();
        }
        if let Some(active) = self.slot.get_mut().take() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(release(Some(active)));
                }
                Err(_) => {
                    warn!(target: "player::engine", "Engine dropped outside a runtime, sound left loaded");
                }
            }
        }
    }
}

/// Clears the busy flag when a load attempt ends, however it ends.
struct LoadingGuard<'a>(&'a AtomicBool);

impl<'a> LoadingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Whether the slot still holds the sound generation `expected` names.
/// `None` means the caller is not tied to a particular sound.
fn holds(slot: &Option<ActiveSound>, expected: Option<u64>) -> bool {
    match expected {
        None => true,
        Some(generation) => slot.as_ref().is_some_and(|a| a.generation == generation),
    }
}

/// Unload a sound that never made it into the slot.
async fn discard(sound: Box<dyn Sound>) {
    if let Err(e) = sound.unload().await {
        warn!(target: "player::engine", error = %e, "Failed to unload half-loaded sound");
    }
}

/// Stop and unload a sound, logging failures.
async fn release(active: Option<ActiveSound>) {
    let Some(active) = active else {
        return;
    };
    if let Err(e) = active.sound.stop().await {
        debug!(target: "player::engine", error = %e, "Stop before unload failed");
    }
    if let Err(e) = active.sound.unload().await {
        warn!(target: "player::engine", error = %e, "Failed to unload sound");
    }
}

/// Owner of the single active sound and publisher of [`PlaybackState`].
///
/// Cheap to clone; all clones drive the same engine.
#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<EngineInner>,
}

impl PlaybackEngine {
    /// Create an engine. Must be called inside a Tokio runtime.
    pub fn new(backend: Arc<dyn SoundBackend>, settings: PlaybackConfig) -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::default());
        let (completions, mut completion_rx) = mpsc::unbounded_channel::<u64>();

        let inner = Arc::new(EngineInner {
            backend,
            settings,
            state_tx,
            slot: AsyncMutex::new(None),
            generation: AtomicU64::new(0),
            loading: AtomicBool::new(false),
            mounted: AtomicBool::new(true),
            progress: Mutex::new(None),
            completions,
            completion_task: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let worker = tokio::spawn(async move {
            while let Some(generation) = completion_rx.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                PlaybackEngine { inner }.handle_completion(generation).await;
            }
        });
        *inner.completion_task.lock() = Some(worker);

        Self { inner }
    }

    /// Current state snapshot.
    pub fn state(&self) -> PlaybackState {
        self.inner.state_tx.borrow().clone()
    }

    /// Receiver that sees every published state.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.inner.state_tx.subscribe()
    }

    /// Replace the queue. The loaded sound is untouched.
    pub fn set_playlist(&self, tracks: impl Into<Arc<[Track]>>) {
        let playlist = tracks.into();
        debug!(target: "player::engine", tracks = playlist.len(), "Playlist replaced");
        self.inner.publish(|s| s.playlist = playlist);
    }

    pub fn set_repeat_mode(&self, mode: RepeatMode) {
        self.inner.publish(|s| s.repeat_mode = mode);
    }

    /// Advance Off → Track → Queue → Off and return the new mode.
    pub fn cycle_repeat_mode(&self) -> RepeatMode {
        let mut mode = RepeatMode::Off;
        self.inner.publish(|s| {
            s.repeat_mode = s.repeat_mode.next();
            mode = s.repeat_mode;
        });
        mode
    }

    /// Load `track` and start playing it, releasing whatever was loaded.
    ///
    /// An empty URI is rejected before anything is touched. A call made
    /// while another load is in flight does nothing.
    pub async fn play_track(&self, track: Track) -> Result<(), PlayerError> {
        self.load(track, None).await
    }

    /// Load `track`. With `expected` set, only replace that sound
    /// generation; anything newer in the slot wins.
    async fn load(&self, track: Track, expected: Option<u64>) -> Result<(), PlayerError> {
        if track.uri.is_empty() {
            warn!(target: "player::engine", id = %track.id, "Track has no URI, not playing");
            return Err(PlayerError::MissingSource(track.id));
        }
        if !self.inner.mounted.load(Ordering::SeqCst) {
            return Err(PlayerError::ShutDown);
        }
        let Some(_loading) = LoadingGuard::acquire(&self.inner.loading) else {
            debug!(target: "player::engine", id = %track.id, "Load already in progress, ignoring");
            return Ok(());
        };

        let mut slot = self.inner.slot.lock().await;
        if !self.inner.mounted.load(Ordering::SeqCst) {
            return Err(PlayerError::ShutDown);
        }
        if !holds(&slot, expected) {
            debug!(target: "player::engine", id = %track.id, "Sound replaced since the signal, not loading");
            return Ok(());
        }
        self.inner.stop_progress();
        release(slot.take()).await;

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.publish(|s| {
            s.status = PlaybackStatus::Loading;
            s.position_ms = 0;
        });

        let options = LoadOptions { should_play: true };
        let sound = match self
            .inner
            .backend
            .create(&track.uri, options, self.completion_listener(generation))
            .await
        {
            Ok(sound) => sound,
            Err(e) => return Err(self.load_failed(&track, e)),
        };

        let status = match sound.status().await {
            Ok(status) if status.is_loaded => status,
            Ok(_) => {
                discard(sound).await;
                return Err(self.load_failed(&track, SoundError::NotLoaded));
            }
            Err(e) => {
                discard(sound).await;
                return Err(self.load_failed(&track, e));
            }
        };

        if !self.inner.mounted.load(Ordering::SeqCst) {
            discard(sound).await;
            return Err(PlayerError::ShutDown);
        }

        *slot = Some(ActiveSound { sound, generation });
        self.inner.publish(|s| {
            s.status = PlaybackStatus::Playing;
            s.current_track = Some(track.clone());
            s.position_ms = status.position_ms;
            s.duration_ms = status.duration_ms.or(track.duration).unwrap_or(0);
        });
        drop(slot);

        self.start_progress(generation);
        info!(target: "player::engine", id = %track.id, title = %track.title, "Playing");
        Ok(())
    }

    /// Pause when playing, resume when paused.
    pub async fn pause_track(&self) -> Result<(), PlayerError> {
        let slot = self.inner.slot.lock().await;
        let Some(active) = slot.as_ref() else {
            return Ok(());
        };

        let status = self.inner.state_tx.borrow().status;
        match status {
            PlaybackStatus::Playing => {
                self.inner.stop_progress();
                active.sound.pause().await.map_err(|e| self.transport_failed("pause", e))?;
                self.inner.publish(|s| s.status = PlaybackStatus::Paused);
            }
            PlaybackStatus::Paused => {
                active.sound.play().await.map_err(|e| self.transport_failed("resume", e))?;
                self.inner.publish(|s| s.status = PlaybackStatus::Playing);
                self.start_progress(active.generation);
            }
            _ => {}
        }
        Ok(())
    }

    /// Move the playhead. Bounds are whatever the sound enforces.
    pub async fn seek_to(&self, position_ms: u64) -> Result<(), PlayerError> {
        let slot = self.inner.slot.lock().await;
        let Some(active) = slot.as_ref() else {
            return Ok(());
        };
        active
            .sound
            .set_position(position_ms)
            .await
            .map_err(|e| self.transport_failed("seek", e))?;
        self.inner.publish(|s| s.position_ms = position_ms);
        Ok(())
    }

    /// Play the next playlist entry; past the last one, stop.
    pub async fn play_next_track(&self) -> Result<(), PlayerError> {
        let (playlist, current) = self.queue_snapshot();
        let transition = next_transition(&playlist, current.as_ref());
        self.apply(transition, &playlist, PlaybackStatus::Idle, None).await
    }

    /// Play the previous entry, or restart the current one once it has
    /// played past the restart threshold.
    pub async fn play_previous_track(&self) -> Result<(), PlayerError> {
        let elapsed = self.elapsed_ms().await;
        let (playlist, current) = self.queue_snapshot();
        let transition = previous_transition(
            &playlist,
            current.as_ref(),
            elapsed,
            self.inner.settings.restart_threshold_ms,
        );
        self.apply(transition, &playlist, PlaybackStatus::Idle, None).await
    }

    /// Release the sound and go idle.
    pub async fn stop(&self) -> Result<(), PlayerError> {
        self.release_and_reset(PlaybackStatus::Idle, None).await;
        info!(target: "player::engine", "Stopped");
        Ok(())
    }

    /// Tear down: ignore every later signal and release the sound.
    ///
    /// A load already in flight holds the slot; it finishes, sees the engine
    /// unmounted and unloads what it created before this returns.
    pub async fn shutdown(&self) {
        if !self.inner.mounted.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.stop_progress();

        let mut slot = self.inner.slot.lock().await;
        release(slot.take()).await;
        info!(target: "player::engine", "Playback engine shut down");
    }

    fn queue_snapshot(&self) -> (Arc<[Track]>, Option<Track>) {
        let state = self.inner.state_tx.borrow();
        (Arc::clone(&state.playlist), state.current_track.clone())
    }

    /// Position of the loaded sound, `None` if it cannot be read.
    async fn elapsed_ms(&self) -> Option<u64> {
        let slot = self.inner.slot.lock().await;
        let active = slot.as_ref()?;
        match active.sound.status().await {
            Ok(status) if status.is_loaded => Some(status.position_ms),
            Ok(_) => None,
            Err(e) => {
                warn!(target: "player::engine", error = %e, "Could not read sound status");
                None
            }
        }
    }

    /// Carry out `transition`. `expected` ties it to one sound generation;
    /// if another sound has taken the slot by then, nothing happens.
    async fn apply(
        &self,
        transition: Transition,
        playlist: &[Track],
        stop_status: PlaybackStatus,
        expected: Option<u64>,
    ) -> Result<(), PlayerError> {
        match transition {
            Transition::Play(index) => match playlist.get(index) {
                Some(track) => self.load(track.clone(), expected).await,
                None => Ok(()),
            },
            Transition::Restart => self.restart_current(expected).await,
            Transition::Stop => {
                self.release_and_reset(stop_status, expected).await;
                Ok(())
            }
            Transition::Stay => Ok(()),
        }
    }

    /// Seek the loaded sound to 0 and play it.
    async fn restart_current(&self, expected: Option<u64>) -> Result<(), PlayerError> {
        let slot = self.inner.slot.lock().await;
        if !holds(&slot, expected) {
            return Ok(());
        }
        let Some(active) = slot.as_ref() else {
            return Ok(());
        };
        self.inner.stop_progress();
        active
            .sound
            .set_position(0)
            .await
            .map_err(|e| self.transport_failed("restart", e))?;
        active
            .sound
            .play()
            .await
            .map_err(|e| self.transport_failed("restart", e))?;

        self.inner.publish(|s| {
            s.status = PlaybackStatus::Playing;
            s.position_ms = 0;
        });
        self.start_progress(active.generation);
        Ok(())
    }

    async fn release_and_reset(&self, status: PlaybackStatus, expected: Option<u64>) {
        let mut slot = self.inner.slot.lock().await;
        if !holds(&slot, expected) {
            debug!(target: "player::engine", "Sound replaced since the signal, not stopping");
            return;
        }
        self.inner.stop_progress();
        release(slot.take()).await;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.publish(|s| s.reset(status));
    }

    async fn handle_completion(&self, generation: u64) {
        if !self.inner.is_current(generation) {
            debug!(target: "player::engine", generation, "Ignoring completion from a released sound");
            return;
        }

        let repeat = self.inner.state_tx.borrow().repeat_mode;
        let (playlist, current) = self.queue_snapshot();
        let transition = completion_transition(repeat, &playlist, current.as_ref());
        debug!(target: "player::engine", ?repeat, ?transition, "Track finished");

        if let Err(e) = self
            .apply(transition, &playlist, PlaybackStatus::Ended, Some(generation))
            .await
        {
            warn!(target: "player::engine", error = %e, "Could not continue after track end");
        }
    }

    fn completion_listener(&self, generation: u64) -> StatusListener {
        let completions = self.inner.completions.clone();
        Box::new(move |status: SoundStatus| {
            if status.is_loaded && status.did_just_finish {
                // The receiver is gone only once the engine is.
                let _ = completions.send(generation);
            }
        })
    }

    /// Poll the sound while it plays. Replaces any running ticker.
    fn start_progress(&self, generation: u64) {
        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let period = Duration::from_millis(self.inner.settings.progress_interval_ms.max(1));

        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if !inner.is_current(generation) {
                    break;
                }

                let status = {
                    let slot = inner.slot.lock().await;
                    match slot.as_ref() {
                        Some(active) if active.generation == generation => active.sound.status().await,
                        _ => break,
                    }
                };

                match status {
                    Ok(status) if status.is_loaded => inner.publish(|s| {
                        if s.status == PlaybackStatus::Playing {
                            s.position_ms = status.position_ms;
                            if let Some(duration) = status.duration_ms {
                                s.duration_ms = duration;
                            }
                        }
                    }),
                    Ok(_) => {}
                    Err(e) => debug!(target: "player::engine", error = %e, "Progress poll failed"),
                }
            }
        });

        if let Some(previous) = self.inner.progress.lock().replace(ticker) {
            previous.abort();
        }
    }

    fn load_failed(&self, track: &Track, e: SoundError) -> PlayerError {
        error!(target: "player::engine", id = %track.id, error = %e, "Failed to play track");
        self.inner.publish(|s| s.reset(PlaybackStatus::Idle));
        PlayerError::ResourceLoad(e)
    }

    fn transport_failed(&self, action: &str, e: SoundError) -> PlayerError {
        warn!(target: "player::engine", action, error = %e, "Transport call failed");
        PlayerError::Transport(e)
    }
}
