//! Pure timer state machine.
//!
//! `TimerCore` owns the interval list and the authoritative wall-clock
//! baseline for one session's timer. Every mutator returns an immutable
//! snapshot ([`TimerStatePublic`]) of the state right after the mutation;
//! `sync()` is the only operation that *observes* elapsed time without an
//! explicit command from a peer. See §4.1 of the spec for the full
//! contract — this module follows it operation-for-operation.

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::constants::MAX_REMAINING_MS;
use crate::model::{Interval, TimerState, TimerStatePublic};

/// The monotonic timer state machine bound to one session's interval list.
#[derive(Debug)]
pub struct TimerCore {
    items: Vec<Interval>,
    state: TimerState,
    clock: Arc<dyn Clock>,
}

impl TimerCore {
    /// Creates a timer core over `items`, using the system wall clock.
    pub fn new(items: Vec<Interval>) -> Self {
        Self::with_clock(items, Arc::new(SystemClock))
    }

    /// Creates a timer core with an injected clock (tests).
    ///
    /// `TimerState::default()` only knows the empty-`items` fallback
    /// duration; a non-empty list must seed `remaining` from its own first
    /// interval or a freshly constructed, stopped timer would misreport
    /// `remaining` against §3's invariant.
    pub fn with_clock(items: Vec<Interval>, clock: Arc<dyn Clock>) -> Self {
        let mut state = TimerState::default();
        if let Some(first) = items.first() {
            state.remaining = first.duration_ms();
        }
        Self { items, state, clock }
    }

    /// Creates a timer core pre-seeded with a restored public snapshot,
    /// performing no re-baselining (see `set_state`).
    pub fn with_state(items: Vec<Interval>, public: TimerStatePublic) -> Self {
        let mut core = Self::new(items);
        core.set_state(public);
        core
    }

    pub fn items(&self) -> &[Interval] {
        &self.items
    }

    fn item_duration_ms(&self, idx: usize) -> i64 {
        self.items
            .get(idx)
            .map(Interval::duration_ms)
            .unwrap_or(crate::constants::DEFAULT_INTERVAL_DURATION_SECS * 1_000)
    }

    fn items_len(&self) -> usize {
        self.items.len().max(1)
    }

    /// Shallow read of the current public state, no side effects.
    pub fn get_state(&self) -> TimerStatePublic {
        self.state.to_public()
    }

    /// Shallow overwrite of the public fields; does not touch the baseline.
    /// Intended for tests and restoring a timer from a prior snapshot.
    pub fn set_state(&mut self, public: TimerStatePublic) {
        self.state.repeat = public.repeat;
        self.state.interval = public.interval;
        self.state.remaining = public.remaining;
        self.state.is_running = public.is_running;
        self.state.is_paused = public.is_paused;
    }

    fn resume_internal(&mut self) {
        if self.state.is_paused {
            let now = self.clock.now_ms();
            self.state.time_paused += now - self.state.paused_at;
            self.state.paused_at = 0;
            self.state.is_paused = false;
        }
    }

    pub fn start(&mut self) -> TimerStatePublic {
        if self.state.is_paused {
            self.resume_internal();
        } else if !self.state.is_running {
            self.state.started_interval = self.state.interval;
            self.state.started_at = self.clock.now_ms();
            self.state.time_paused = 0;
        }
        self.state.is_running = true;
        self.state.is_paused = false;
        self.state.paused_at = 0;
        self.state.to_public()
    }

    pub fn pause(&mut self) -> TimerStatePublic {
        self.state.is_paused = true;
        self.state.paused_at = self.clock.now_ms();
        self.state.to_public()
    }

    pub fn stop(&mut self) -> TimerStatePublic {
        let repeat = self.state.repeat;
        self.state = TimerState {
            repeat,
            interval: 0,
            remaining: self.item_duration_ms(0),
            is_running: false,
            is_paused: false,
            started_interval: 0,
            started_at: 0,
            paused_at: 0,
            time_paused: 0,
        };
        self.state.to_public()
    }

    pub fn repeat(&mut self, value: Option<bool>) -> TimerStatePublic {
        self.state.repeat = value.unwrap_or(!self.state.repeat);
        self.state.to_public()
    }

    pub fn next(&mut self) -> TimerStatePublic {
        let len = self.items_len();
        self.state.interval = (self.state.interval + 1) % len;
        self.state.remaining = self.item_duration_ms(self.state.interval);
        if self.state.is_running {
            let now = self.clock.now_ms();
            self.state.started_interval = self.state.interval;
            self.state.started_at = now;
            self.state.time_paused = 0;
            self.state.paused_at = if self.state.is_paused { now } else { 0 };
        }
        self.state.to_public()
    }

    pub fn resume(&mut self) -> TimerStatePublic {
        self.resume_internal();
        self.state.to_public()
    }

    /// Advances the authoritative state to the current wall-clock time,
    /// folding elapsed intervals (and repeat-wrap / stop-on-end) into
    /// `(interval, remaining)`. Never emits `remaining < 0`.
    pub fn sync(&mut self) -> TimerStatePublic {
        if !self.state.is_running || self.state.started_at == 0 || self.items.is_empty() {
            return self.state.to_public();
        }

        let now = self.clock.now_ms();
        let offset = if self.state.is_paused && self.state.paused_at > 0 {
            now - self.state.paused_at
        } else {
            0
        };
        let mut elapsed = now - self.state.started_at - self.state.time_paused - offset;
        let mut current = self.state.started_interval % self.items.len();

        loop {
            let duration_ms = self.items[current].duration_ms();
            if elapsed < duration_ms {
                self.state.interval = current;
                self.state.remaining = duration_ms - elapsed;
                return self.state.to_public();
            }
            elapsed -= duration_ms;
            current += 1;
            if current >= self.items.len() {
                if self.state.repeat {
                    current = 0;
                } else {
                    return self.stop();
                }
            }
        }
    }

    /// Rebinds the interval list, re-baselining the running timer so a
    /// shrinking active duration clamps instead of going negative (the
    /// behavior this spec nails down explicitly — see the design notes on
    /// the source's "time remaining calculated incorrectly" comment).
    ///
    /// `self.state.remaining` is not kept live by wall-clock ticks — only
    /// `sync()`/`update_state()`/`stop()`/`next()` ever write it — so it
    /// cannot be trusted as "the current remaining time" here. The true
    /// current remaining in the *active* interval is re-derived from the
    /// old duration and the elapsed-since-`startedAt` baseline, captured
    /// before `self.items` is overwritten.
    pub fn update_intervals(&mut self, new_items: Vec<Interval>) -> TimerStatePublic {
        let now = self.clock.now_ms();
        let old_duration_ms = self.item_duration_ms(self.state.interval);
        self.items = new_items;
        let new_len = self.items.len();

        if self.state.interval >= new_len {
            self.state.interval = 0;
            self.state.started_interval = 0;
            self.state.remaining = self.item_duration_ms(0);
            if self.state.started_at != 0 {
                self.state.started_at = now;
            }
            if self.state.paused_at != 0 {
                self.state.paused_at = now;
            }
            return self.state.to_public();
        }

        if self.state.is_running {
            let new_duration = self.item_duration_ms(self.state.interval);
            let elapsed = now - self.state.started_at - self.state.time_paused;
            let true_remaining = (old_duration_ms - elapsed).max(0);
            self.state.started_at = now - elapsed;
            self.state.started_interval = self.state.interval;
            self.state.time_paused = 0;
            self.state.paused_at = if self.state.is_paused { now } else { 0 };
            self.state.remaining = true_remaining;
            if self.state.remaining > new_duration {
                self.state.remaining = new_duration;
                self.state.started_at = now;
            }
        } else {
            self.state.remaining = self.item_duration_ms(self.state.interval);
        }

        self.state.to_public()
    }

    /// Imports a peer's view of the timer, re-deriving the baseline from it.
    pub fn update_state(&mut self, external: TimerStatePublic) -> TimerStatePublic {
        self.state.repeat = external.repeat;
        self.state.interval = external.interval;
        self.state.remaining = external.remaining.clamp(0, MAX_REMAINING_MS);
        self.state.is_running = external.is_running;
        self.state.is_paused = external.is_paused;

        let now = self.clock.now_ms();
        let duration_ms = self.item_duration_ms(self.state.interval);
        let elapsed = duration_ms - self.state.remaining;
        self.state.started_interval = self.state.interval;
        self.state.started_at = if self.state.is_running { now - elapsed } else { 0 };
        self.state.paused_at = if self.state.is_paused { now } else { 0 };
        self.state.time_paused = 0;

        self.state.to_public()
    }
}
