//! Countdown timers that drive brightness changes over time.
//!
//! Ticks are logical: each tick removes exactly one second from the
//! remaining time, no matter how late it is delivered.

mod countdown;
mod engine;

pub use countdown::TimerPhase;
#[cfg(test)]
pub use countdown::TICK;
pub use engine::{CombinedLeg, TimerEngine, TimerEvent, TimerStatus};
