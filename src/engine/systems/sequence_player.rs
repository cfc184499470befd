use std::fmt;
use std::ops::ControlFlow;
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError, Weak };
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{ debug, trace };

use super::timer::RepeatingTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerState {
    Initial,
    Playing,
    Paused,
    Completed,
    Disabled,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayerState::Initial => "initial",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Completed => "completed",
            PlayerState::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlayerError {
    #[error("player is disabled: the sequence has fewer than two frames")]
    Disabled,
    #[error("seek to frame {index} but the sequence has {len} frames")]
    SeekOutOfRange {
        index: usize,
        len: usize,
    },
    #[error("tick interval {0:?} is outside 10..=50 ms")]
    InvalidTickInterval(Duration),
    #[error("no tokio runtime to run the player's timer on")]
    NoRuntime,
}

pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(10);
pub const MAX_TICK_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_TICK_INTERVAL: TickInterval = TickInterval(Duration::from_millis(20));

/// Period between two autonomous frame advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TickInterval(Duration);

impl TickInterval {
    pub fn new(period: Duration) -> Result<Self, PlayerError> {
        if (MIN_TICK_INTERVAL..=MAX_TICK_INTERVAL).contains(&period) {
            Ok(Self(period))
        } else {
            Err(PlayerError::InvalidTickInterval(period))
        }
    }

    pub fn from_millis(millis: u64) -> Result<Self, PlayerError> {
        Self::new(Duration::from_millis(millis))
    }

    pub fn period(&self) -> Duration {
        self.0
    }
}

impl Default for TickInterval {
    fn default() -> Self {
        DEFAULT_TICK_INTERVAL
    }
}

type FrameCallback<T> = Box<dyn FnMut(&T) + Send>;

struct PlayerInner<T> {
    sequence: Arc<[T]>,
    frame: usize,
    state: PlayerState,
    /// Bumped every time the timer is stopped or re-armed. A tick carrying an
    /// older generation is stale and ends its schedule.
    generation: u64,
    tick_interval: TickInterval,
    timer: RepeatingTimer,
    on_frame_changed: FrameCallback<T>,
    state_tx: watch::Sender<PlayerState>,
    this: Weak<Mutex<PlayerInner<T>>>,
}

impl<T: Send + Sync + 'static> PlayerInner<T> {
    fn last_index(&self) -> usize {
        self.sequence.len().saturating_sub(1)
    }

    fn set_state(&mut self, state: PlayerState) {
        if self.state != state {
            trace!(from = %self.state, to = %state, "player state changed");
            self.state = state;
            self.state_tx.send_replace(state);
        }
    }

    fn notify(&mut self) {
        if let Some(snapshot) = self.sequence.get(self.frame) {
            (self.on_frame_changed)(snapshot);
        }
    }

    fn stop_timer(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.timer.stop();
    }

    fn arm_timer(&mut self) {
        self.stop_timer();
        let generation = self.generation;
        let this = self.this.clone();
        self.timer.start(self.tick_interval.period(), move || {
            let Some(inner) = this.upgrade() else {
                return ControlFlow::Break(());
            };
            let mut guard = lock(&inner);
            if guard.generation != generation {
                return ControlFlow::Break(());
            }
            guard.tick()
        });
    }

    fn tick(&mut self) -> ControlFlow<()> {
        if self.state != PlayerState::Playing {
            return ControlFlow::Break(());
        }

        let last = self.last_index();
        if self.frame < last {
            self.frame += 1;
            self.notify();
        }
        if self.frame >= last {
            self.stop_timer();
            self.set_state(PlayerState::Completed);
            debug!(frames = self.sequence.len(), "playback completed");
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    fn load(&mut self, sequence: Arc<[T]>, autoplay: bool) {
        self.stop_timer();
        self.sequence = sequence;
        self.frame = 0;

        if self.sequence.len() <= 1 {
            self.set_state(PlayerState::Disabled);
            return;
        }

        self.notify();
        if autoplay {
            self.set_state(PlayerState::Playing);
            self.arm_timer();
        } else {
            self.set_state(PlayerState::Initial);
        }
    }

    fn play_pause(&mut self) {
        match self.state {
            PlayerState::Disabled => {}
            PlayerState::Playing => {
                self.stop_timer();
                self.set_state(PlayerState::Paused);
            }
            PlayerState::Completed => {
                self.frame = 0;
                self.notify();
                self.set_state(PlayerState::Playing);
                self.arm_timer();
            }
            PlayerState::Initial | PlayerState::Paused => {
                self.set_state(PlayerState::Playing);
                self.arm_timer();
            }
        }
    }

    fn seek(&mut self, index: usize) -> Result<(), PlayerError> {
        if self.state == PlayerState::Disabled {
            return Err(PlayerError::Disabled);
        }
        let len = self.sequence.len();
        if index >= len {
            return Err(PlayerError::SeekOutOfRange { index, len });
        }

        self.stop_timer();
        let changed = self.frame != index;
        self.frame = index;
        if changed {
            self.notify();
        }
        if index == self.last_index() {
            self.set_state(PlayerState::Completed);
        } else {
            self.set_state(PlayerState::Paused);
        }
        Ok(())
    }
}

fn lock<T>(inner: &Mutex<PlayerInner<T>>) -> MutexGuard<'_, PlayerInner<T>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Steps through an immutable sequence one frame per tick.
///
/// `on_frame_changed` is called with the frame at the new index every time
/// the index changes, whether by a tick, a seek or a new sequence. It runs
/// while the player is locked, so it must not call back into the player.
///
/// The timer is a task on a tokio runtime: either the one `new` is called
/// from or the one handed to `with_runtime`. Dropping the player stops the
/// timer.
pub struct SequencePlayer<T> {
    inner: Arc<Mutex<PlayerInner<T>>>,
}

impl<T: Send + Sync + 'static> SequencePlayer<T> {
    /// Player showing frame 0 of `sequence`, waiting for play, with its timer
    /// on the current runtime.
    ///
    /// A sequence of fewer than two frames leaves the player `Disabled`.
    /// Fails with [`PlayerError::NoRuntime`] outside a tokio runtime.
    pub fn new<F>(sequence: impl Into<Arc<[T]>>, on_frame_changed: F) -> Result<Self, PlayerError>
        where F: FnMut(&T) + Send + 'static
    {
        let runtime = Handle::try_current().map_err(|_| PlayerError::NoRuntime)?;
        Ok(Self::with_runtime(runtime, sequence, on_frame_changed))
    }

    pub fn with_runtime<F>(runtime: Handle, sequence: impl Into<Arc<[T]>>, on_frame_changed: F) -> Self
        where F: FnMut(&T) + Send + 'static
    {
        let (state_tx, _) = watch::channel(PlayerState::Initial);
        let inner = Arc::new_cyclic(|this| {
            Mutex::new(PlayerInner {
                sequence: Arc::from(Vec::new()),
                frame: 0,
                state: PlayerState::Initial,
                generation: 0,
                tick_interval: TickInterval::default(),
                timer: RepeatingTimer::new(runtime),
                on_frame_changed: Box::new(on_frame_changed),
                state_tx,
                this: this.clone(),
            })
        });
        lock(&inner).load(sequence.into(), false);
        Self { inner }
    }

    /// Applies from the next time the timer is armed.
    pub fn with_tick_interval(self, tick_interval: TickInterval) -> Self {
        lock(&self.inner).tick_interval = tick_interval;
        self
    }

    /// Replaces the sequence and starts playing it from frame 0.
    ///
    /// Any armed timer is stopped first, so no tick of the previous sequence
    /// can land after this returns.
    pub fn set_sequence(&self, sequence: impl Into<Arc<[T]>>) {
        let sequence = sequence.into();
        debug!(frames = sequence.len(), "sequence assigned");
        lock(&self.inner).load(sequence, true);
    }

    /// Toggles between playing and paused. From `Completed` playback starts
    /// over at frame 0. Does nothing while `Disabled`.
    pub fn play_pause(&self) {
        lock(&self.inner).play_pause();
    }

    /// Jumps to `index` and stops. Ends in `Completed` for the last frame and
    /// in `Paused` otherwise.
    pub fn seek(&self, index: usize) -> Result<(), PlayerError> {
        lock(&self.inner).seek(index)
    }

    pub fn restart(&self) -> Result<(), PlayerError> {
        let mut inner = lock(&self.inner);
        inner.seek(0)?;
        inner.play_pause();
        Ok(())
    }

    pub fn state(&self) -> PlayerState {
        lock(&self.inner).state
    }

    pub fn frame_index(&self) -> usize {
        lock(&self.inner).frame
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tick_interval(&self) -> TickInterval {
        lock(&self.inner).tick_interval
    }

    pub fn sequence(&self) -> Arc<[T]> {
        Arc::clone(&lock(&self.inner).sequence)
    }

    /// Receiver that observes every state change, e.g. to await `Completed`.
    pub fn subscribe_state(&self) -> watch::Receiver<PlayerState> {
        lock(&self.inner).state_tx.subscribe()
    }
}

impl<T: Clone + Send + Sync + 'static> SequencePlayer<T> {
    pub fn current_frame(&self) -> Option<T> {
        let inner = lock(&self.inner);
        inner.sequence.get(inner.frame).cloned()
    }
}

impl<T> fmt::Debug for SequencePlayer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("SequencePlayer")
            .field("state", &inner.state)
            .field("frame", &inner.frame)
            .field("len", &inner.sequence.len())
            .field("tick_interval", &inner.tick_interval)
            .finish()
    }
}

impl<T> Drop for SequencePlayer<T> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.generation = inner.generation.wrapping_add(1);
        inner.timer.stop();
    }
}
