//! Port over the platform audio service.
//!
//! A [`Sound`] is one loaded decoder/player handle. The engine owns at most
//! one at a time and is the only caller of these methods.

use async_trait::async_trait;

/// Snapshot of a sound's playback status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoundStatus {
    pub is_loaded: bool,
    pub position_ms: u64,
    /// Unknown until the decoder has probed the stream
    pub duration_ms: Option<u64>,
    /// Set on the status update emitted when playback reaches the end
    pub did_just_finish: bool,
}

/// Options for creating a sound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Start playing as soon as the sound is loaded
    pub should_play: bool,
}

/// Callback for status updates pushed by the audio service.
pub type StatusListener = Box<dyn Fn(SoundStatus) + Send + Sync>;

/// Audio service failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SoundError {
    #[error("Failed to load {uri}: {message}")]
    Load { uri: String, message: String },

    #[error("Sound is not loaded")]
    NotLoaded,

    #[error("Audio service error: {0}")]
    Service(String),
}

/// Creates sounds.
#[async_trait]
pub trait SoundBackend: Send + Sync {
    /// Load `uri`. The listener receives every status update of the new
    /// sound until it is unloaded.
    async fn create(
        &self,
        uri: &str,
        options: LoadOptions,
        listener: StatusListener,
    ) -> Result<Box<dyn Sound>, SoundError>;
}

/// One loaded sound resource.
#[async_trait]
pub trait Sound: Send + Sync {
    async fn play(&self) -> Result<(), SoundError>;
    async fn pause(&self) -> Result<(), SoundError>;
    async fn stop(&self) -> Result<(), SoundError>;
    /// Release the decoder. The sound is unusable afterwards.
    async fn unload(&self) -> Result<(), SoundError>;
    async fn set_position(&self, position_ms: u64) -> Result<(), SoundError>;
    async fn status(&self) -> Result<SoundStatus, SoundError>;
}

/// Scriptable in-memory audio service for tests.
#[cfg(test)]
pub mod mocks {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub const MOCK_DURATION_MS: u64 = 180_000;

    #[derive(Debug, Default)]
    struct Playhead {
        loaded: bool,
        playing: bool,
        position_ms: u64,
        calls: Vec<String>,
    }

    /// State of one created sound, inspectable from tests.
    pub struct MockSound {
        pub uri: String,
        playhead: Mutex<Playhead>,
        listener: StatusListener,
        backend: Arc<Shared>,
    }

    impl MockSound {
        pub fn is_loaded(&self) -> bool {
            self.playhead.lock().loaded
        }

        pub fn is_playing(&self) -> bool {
            self.playhead.lock().playing
        }

        pub fn position_ms(&self) -> u64 {
            self.playhead.lock().position_ms
        }

        /// Methods called on this sound, in order (`set_position:0`, `play`, ...).
        pub fn calls(&self) -> Vec<String> {
            self.playhead.lock().calls.clone()
        }

        fn status_now(&self) -> SoundStatus {
            let head = self.playhead.lock();
            SoundStatus {
                is_loaded: head.loaded,
                position_ms: head.position_ms,
                duration_ms: head.loaded.then_some(MOCK_DURATION_MS),
                did_just_finish: false,
            }
        }

        fn record(&self, call: String) -> Result<(), SoundError> {
            let mut head = self.playhead.lock();
            head.calls.push(call);
            if head.loaded {
                Ok(())
            } else {
                Err(SoundError::NotLoaded)
            }
        }
    }

    #[derive(Default)]
    struct Shared {
        sounds: Mutex<Vec<Arc<MockSound>>>,
        live: AtomicUsize,
        max_alive: AtomicUsize,
        status_failures: AtomicUsize,
        fail_uri: Mutex<Option<String>>,
        load_delay: Mutex<Option<Duration>>,
        stop_delay: Mutex<Option<Duration>>,
        status_delay: Mutex<Option<Duration>>,
    }

    /// Audio service double. Every created sound reports a three-minute
    /// duration and stays loaded until unloaded.
    #[derive(Clone, Default)]
    pub struct MockBackend {
        shared: Arc<Shared>,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make loading `uri` fail.
        pub fn fail_uri(&self, uri: &str) {
            *self.shared.fail_uri.lock() = Some(uri.to_string());
        }

        /// Make the next `count` calls to `status()` fail.
        pub fn fail_next_status_reads(&self, count: usize) {
            self.shared.status_failures.store(count, Ordering::SeqCst);
        }

        /// Delay each `create()` call.
        pub fn set_load_delay(&self, delay: Duration) {
            *self.shared.load_delay.lock() = Some(delay);
        }

        /// Delay each `stop()` call.
        pub fn set_stop_delay(&self, delay: Duration) {
            *self.shared.stop_delay.lock() = Some(delay);
        }

        /// Delay each `status()` call.
        pub fn set_status_delay(&self, delay: Duration) {
            *self.shared.status_delay.lock() = Some(delay);
        }

        /// The `index`-th sound created (0-based).
        pub fn sound(&self, index: usize) -> Arc<MockSound> {
            Arc::clone(&self.shared.sounds.lock()[index])
        }

        pub fn created_count(&self) -> usize {
            self.shared.sounds.lock().len()
        }

        /// Sounds created and not yet unloaded.
        pub fn live_count(&self) -> usize {
            self.shared.live.load(Ordering::SeqCst)
        }

        /// Highest number of sounds that were ever loaded at once.
        pub fn max_alive(&self) -> usize {
            self.shared.max_alive.load(Ordering::SeqCst)
        }

        /// Move the playhead of sound `index`.
        pub fn set_elapsed(&self, index: usize, position_ms: u64) {
            self.sound(index).playhead.lock().position_ms = position_ms;
        }

        /// Emit the end-of-track status update for sound `index`.
        pub fn finish(&self, index: usize) {
            let sound = self.sound(index);
            {
                let mut head = sound.playhead.lock();
                head.playing = false;
                head.position_ms = MOCK_DURATION_MS;
            }
            (sound.listener)(SoundStatus {
                is_loaded: true,
                position_ms: MOCK_DURATION_MS,
                duration_ms: Some(MOCK_DURATION_MS),
                did_just_finish: true,
            });
        }
    }

    #[async_trait]
    impl SoundBackend for MockBackend {
        async fn create(
            &self,
            uri: &str,
            options: LoadOptions,
            listener: StatusListener,
        ) -> Result<Box<dyn Sound>, SoundError> {
            let delay = *self.shared.load_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.shared.fail_uri.lock().as_deref() == Some(uri) {
                return Err(SoundError::Load {
                    uri: uri.to_string(),
                    message: "decoder rejected stream".to_string(),
                });
            }

            let sound = Arc::new(MockSound {
                uri: uri.to_string(),
                playhead: Mutex::new(Playhead {
                    loaded: true,
                    playing: options.should_play,
                    position_ms: 0,
                    calls: Vec::new(),
                }),
                listener,
                backend: Arc::clone(&self.shared),
            });
            self.shared.sounds.lock().push(Arc::clone(&sound));
            let live = self.shared.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.shared.max_alive.fetch_max(live, Ordering::SeqCst);

            Ok(Box::new(MockHandle(sound)))
        }
    }

    struct MockHandle(Arc<MockSound>);

    #[async_trait]
    impl Sound for MockHandle {
        async fn play(&self) -> Result<(), SoundError> {
            self.0.record("play".to_string())?;
            self.0.playhead.lock().playing = true;
            Ok(())
        }

        async fn pause(&self) -> Result<(), SoundError> {
            self.0.record("pause".to_string())?;
            self.0.playhead.lock().playing = false;
            Ok(())
        }

        async fn stop(&self) -> Result<(), SoundError> {
            let delay = *self.0.backend.stop_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.0.record("stop".to_string())?;
            let mut head = self.0.playhead.lock();
            head.playing = false;
            head.position_ms = 0;
            Ok(())
        }

        async fn unload(&self) -> Result<(), SoundError> {
            let mut head = self.0.playhead.lock();
            head.calls.push("unload".to_string());
            if head.loaded {
                head.loaded = false;
                head.playing = false;
                self.0.backend.live.fetch_sub(1, Ordering::SeqCst);
            }
            Ok(())
        }

        async fn set_position(&self, position_ms: u64) -> Result<(), SoundError> {
            self.0.record(format!("set_position:{}", position_ms))?;
            self.0.playhead.lock().position_ms = position_ms.min(MOCK_DURATION_MS);
            Ok(())
        }

        async fn status(&self) -> Result<SoundStatus, SoundError> {
            let delay = *self.0.backend.status_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let failures = &self.0.backend.status_failures;
            if failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(SoundError::Service("status unavailable".to_string()));
            }
            Ok(self.0.status_now())
        }
    }
}
