//! Presentation side of playback: a play/pause/stop state machine shared
//! between threads, a bounded frame queue, and a presenter that drops
//! frames it is too late for.

use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};

/// How often a blocked presenter wakes up to look at the playback state.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Paused,
    Playing,
}

/// Shared playback state. Every transition wakes all waiters.
#[derive(Debug)]
pub struct PlaybackControl {
    state: Mutex<PlaybackState>,
    changed: Condvar,
}

impl Default for PlaybackControl {
    fn default() -> Self {
        PlaybackControl {
            state: Mutex::new(PlaybackState::Stopped),
            changed: Condvar::new(),
        }
    }
}

impl PlaybackControl {
    pub fn new() -> PlaybackControl {
        PlaybackControl::default()
    }

    fn lock(&self) -> MutexGuard<'_, PlaybackState> {
        // A plain enum cannot be left half-written, so poisoning is ignored.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> PlaybackState {
        *self.lock()
    }

    fn set(&self, next: PlaybackState) {
        let mut state = self.lock();
        if *state != next {
            debug!("playback {:?} -> {:?}", *state, next);
            *state = next;
        }
        self.changed.notify_all();
    }

    pub fn play(&self) {
        self.set(PlaybackState::Playing);
    }

    /// Pausing a stopped player does nothing.
    pub fn pause(&self) {
        let mut state = self.lock();
        if *state == PlaybackState::Playing {
            debug!("playback Playing -> Paused");
            *state = PlaybackState::Paused;
            self.changed.notify_all();
        }
    }

    pub fn stop(&self) {
        self.set(PlaybackState::Stopped);
    }

    /// Block until the state is not `Paused`, and return it.
    pub fn wait_while_paused(&self) -> PlaybackState {
        let guard = self.lock();
        let guard = self
            .changed
            .wait_while(guard, |s| *s == PlaybackState::Paused)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Time since playback started.
pub trait Clock {
    fn now(&self) -> Duration;

    /// Return no earlier than `t`.
    fn sleep_until(&self, t: Duration);
}

/// Wall clock time.
#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> SystemClock {
        SystemClock { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep_until(&self, t: Duration) {
        if let Some(wait) = t.checked_sub(self.now()) {
            thread::sleep(wait);
        }
    }
}

/// An item with the time it should be presented at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timed<T> {
    pub presentation_time: Duration,
    pub item: T,
}

/// Bounded queue between a decoding thread and a presenter. A full queue
/// blocks the producer.
pub fn frame_queue<T>(capacity: usize) -> (SyncSender<Timed<T>>, Receiver<Timed<T>>) {
    sync_channel(capacity)
}

/// Producer loop: send `items` until they run out, playback stops, or the
/// presenter goes away. Returns how many were sent.
pub fn feed<T, I>(control: &PlaybackControl, queue: &SyncSender<Timed<T>>, items: I) -> usize
where
    I: IntoIterator<Item = Timed<T>>,
{
    let mut sent = 0;
    for item in items {
        if control.wait_while_paused() == PlaybackState::Stopped {
            break;
        }
        if queue.send(item).is_err() {
            break;
        }
        sent += 1;
    }
    trace!("producer done after {} items", sent);
    sent
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PresenterStats {
    pub shown: u64,
    pub dropped: u64,
}

/// Consumer loop: shows each frame at its presentation time, skipping any
/// whose time has already passed. Time spent paused does not count.
pub struct Presenter<'c, C> {
    control: &'c PlaybackControl,
    clock: C,
}

impl<'c, C: Clock> Presenter<'c, C> {
    pub fn new(control: &'c PlaybackControl, clock: C) -> Self {
        Presenter { control, clock }
    }

    /// Run until playback stops or the queue is closed and drained.
    pub fn run<T, F: FnMut(T)>(&mut self, queue: &Receiver<Timed<T>>, mut show: F) -> PresenterStats {
        let mut stats = PresenterStats::default();
        let mut paused = Duration::ZERO;

        loop {
            let before = self.clock.now();
            if self.control.wait_while_paused() == PlaybackState::Stopped {
                break;
            }
            paused += self.clock.now().saturating_sub(before);

            let frame = match queue.recv_timeout(POLL_INTERVAL) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let due = frame.presentation_time + paused;
            if due < self.clock.now() {
                trace!("dropping frame due at {:?}", frame.presentation_time);
                stats.dropped += 1;
                continue;
            }
            self.clock.sleep_until(due);
            show(frame.item);
            stats.shown += 1;
        }
        debug!("presenter done: {} shown, {} dropped", stats.shown, stats.dropped);
        stats
    }
}
