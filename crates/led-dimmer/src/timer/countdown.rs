//! Single countdown state machine.

use std::time::Duration;
use tokio::time::Instant;

/// Tick length in milliseconds.
pub const TICK_MS: u64 = 1000;

/// Tick cadence.
pub const TICK: Duration = Duration::from_millis(TICK_MS);

/// Lifecycle phase of a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    /// No countdown.
    Idle,
    /// Ticking.
    Running,
    /// Frozen; resumes from the same remaining time.
    Paused,
    /// Reached zero.
    Expired,
    /// Reset before reaching zero.
    Cancelled,
}

impl std::fmt::Display for TimerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerPhase::Idle => write!(f, "idle"),
            TimerPhase::Running => write!(f, "running"),
            TimerPhase::Paused => write!(f, "paused"),
            TimerPhase::Expired => write!(f, "expired"),
            TimerPhase::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Result of applying one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still running with this much time left.
    Remaining(u64),
    /// Reached zero on this tick.
    Expired,
}

/// One countdown toward a forced brightness of zero.
#[derive(Debug, Clone)]
pub struct Countdown {
    target_brightness: u8,
    remaining_ms: u64,
    phase: TimerPhase,
    next_tick: Option<Instant>,
}

impl Countdown {
    /// Starts a running countdown; the first tick is due one tick after `now`.
    pub fn start(target_brightness: u8, remaining_ms: u64, now: Instant) -> Self {
        Self {
            target_brightness,
            remaining_ms,
            phase: TimerPhase::Running,
            next_tick: Some(now + TICK),
        }
    }

    pub fn target_brightness(&self) -> u8 {
        self.target_brightness
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    /// When the next tick is due, if running.
    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Returns true while running or paused.
    pub fn is_active(&self) -> bool {
        matches!(self.phase, TimerPhase::Running | TimerPhase::Paused)
    }

    /// Returns true if a tick is due at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_tick.is_some_and(|due| due <= now)
    }

    /// Stops ticking without touching the remaining time.
    pub fn pause(&mut self) -> bool {
        if self.phase != TimerPhase::Running {
            return false;
        }
        self.phase = TimerPhase::Paused;
        self.next_tick = None;
        true
    }

    /// Resumes ticking from the frozen remaining time.
    pub fn resume(&mut self, now: Instant) -> bool {
        if self.phase != TimerPhase::Paused {
            return false;
        }
        self.phase = TimerPhase::Running;
        self.next_tick = Some(now + TICK);
        true
    }

    /// Stops the countdown and clears the remaining time.
    pub fn cancel(&mut self) {
        self.phase = TimerPhase::Cancelled;
        self.remaining_ms = 0;
        self.next_tick = None;
    }

    /// Applies one tick. Only valid while running.
    pub fn tick(&mut self, now: Instant) -> Option<TickOutcome> {
        if self.phase != TimerPhase::Running {
            return None;
        }

        self.remaining_ms = self.remaining_ms.saturating_sub(TICK_MS);
        if self.remaining_ms == 0 {
            self.phase = TimerPhase::Expired;
            self.next_tick = None;
            return Some(TickOutcome::Expired);
        }

        // Late delivery does not cause catch-up ticks.
        let next = self.next_tick.map_or(now, |due| due + TICK);
        self.next_tick = Some(if next <= now { now + TICK } else { next });
        Some(TickOutcome::Remaining(self.remaining_ms))
    }
}
