//! Per-channel and combined countdowns.

use super::countdown::{Countdown, TickOutcome, TimerPhase};
use led_dimmer_hw::Channel;
use std::collections::BTreeMap;
use tokio::time::Instant;
use tracing::debug;

/// Something the controller has to act on after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// A countdown advanced.
    Tick { channel: Channel, remaining_ms: u64 },
    /// A per-channel timer reached zero.
    Expired { channel: Channel },
    /// One half of the combined timer reached zero; the other may still run.
    LegExpired { channel: Channel },
    /// Both halves of the combined timer have reached zero.
    CombinedExpired,
}

/// Snapshot of one countdown for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerStatus {
    pub channel: Channel,
    pub phase: TimerPhase,
    pub remaining_ms: u64,
    pub target_brightness: u8,
}

/// Start parameters for one half of the combined timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombinedLeg {
    pub channel: Channel,
    pub brightness: u8,
    pub duration_ms: u64,
}

/// Owns every countdown.
///
/// Per-channel timers are removed once they expire; a reset one stays visible
/// as cancelled until the next start. The combined timer keeps expired legs
/// (showing zero) until its last leg expires.
#[derive(Debug, Default)]
pub struct TimerEngine {
    channels: BTreeMap<Channel, Countdown>,
    combined: Option<BTreeMap<Channel, Countdown>>,
}

impl TimerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) the per-channel timer.
    pub fn start(&mut self, channel: Channel, brightness: u8, duration_ms: u64, now: Instant) {
        if self.channels.get(&channel).is_some_and(Countdown::is_active) {
            debug!("Replacing running timer on LED {}", channel);
        }
        self.channels
            .insert(channel, Countdown::start(brightness, duration_ms, now));
    }

    /// Pauses the per-channel timer. Returns false if it was not running.
    pub fn pause(&mut self, channel: Channel) -> bool {
        self.channels
            .get_mut(&channel)
            .is_some_and(Countdown::pause)
    }

    /// Resumes the per-channel timer. Returns false if it was not paused.
    pub fn resume(&mut self, channel: Channel, now: Instant) -> bool {
        self.channels
            .get_mut(&channel)
            .is_some_and(|countdown| countdown.resume(now))
    }

    /// Cancels the per-channel timer. Returns false if none was running or paused.
    pub fn reset(&mut self, channel: Channel) -> bool {
        match self.channels.get_mut(&channel) {
            Some(countdown) if countdown.is_active() => {
                countdown.cancel();
                true
            }
            _ => false,
        }
    }

    /// Status of the per-channel timer, if one exists.
    pub fn status(&self, channel: Channel) -> Option<TimerStatus> {
        self.channels
            .get(&channel)
            .map(|countdown| status_of(channel, countdown))
    }

    /// Starts (or restarts) the combined timer.
    pub fn start_combined(&mut self, legs: [CombinedLeg; 2], now: Instant) {
        if self.combined.is_some() {
            debug!("Replacing running combined timer");
        }
        let legs = legs
            .iter()
            .map(|leg| {
                (
                    leg.channel,
                    Countdown::start(leg.brightness, leg.duration_ms, now),
                )
            })
            .collect();
        self.combined = Some(legs);
    }

    /// Pauses every running leg. Returns false if nothing was running.
    pub fn pause_combined(&mut self) -> bool {
        self.combined.as_mut().is_some_and(|legs| {
            legs.values_mut()
                .fold(false, |paused, countdown| countdown.pause() || paused)
        })
    }

    /// Resumes every paused leg. Returns false if nothing was paused.
    pub fn resume_combined(&mut self, now: Instant) -> bool {
        self.combined.as_mut().is_some_and(|legs| {
            legs.values_mut()
                .fold(false, |resumed, countdown| countdown.resume(now) || resumed)
        })
    }

    /// Drops the combined timer. Returns the channels it covered.
    pub fn reset_combined(&mut self) -> Vec<Channel> {
        self.combined
            .take()
            .map(|legs| legs.into_keys().collect())
            .unwrap_or_default()
    }

    /// Status of each combined leg, if the combined timer exists.
    pub fn combined_status(&self) -> Option<Vec<TimerStatus>> {
        self.combined.as_ref().map(|legs| {
            legs.iter()
                .map(|(channel, countdown)| status_of(*channel, countdown))
                .collect()
        })
    }

    /// Earliest instant at which any countdown is due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.channels
            .values()
            .chain(self.combined.iter().flat_map(|legs| legs.values()))
            .filter_map(Countdown::next_tick)
            .min()
    }

    /// Applies every tick due at `now` and reports what happened.
    pub fn poll(&mut self, now: Instant) -> Vec<TimerEvent> {
        let mut events = Vec::new();

        let mut expired = Vec::new();
        for (channel, countdown) in self.channels.iter_mut() {
            if !countdown.is_due(now) {
                continue;
            }
            match countdown.tick(now) {
                Some(TickOutcome::Remaining(remaining_ms)) => events.push(TimerEvent::Tick {
                    channel: *channel,
                    remaining_ms,
                }),
                Some(TickOutcome::Expired) => expired.push(*channel),
                None => {}
            }
        }
        for channel in expired {
            self.channels.remove(&channel);
            events.push(TimerEvent::Expired { channel });
        }

        if let Some(legs) = self.combined.as_mut() {
            for (channel, countdown) in legs.iter_mut() {
                if !countdown.is_due(now) {
                    continue;
                }
                match countdown.tick(now) {
                    Some(TickOutcome::Remaining(remaining_ms)) => events.push(TimerEvent::Tick {
                        channel: *channel,
                        remaining_ms,
                    }),
                    Some(TickOutcome::Expired) => {
                        events.push(TimerEvent::LegExpired { channel: *channel })
                    }
                    None => {}
                }
            }
            if legs
                .values()
                .all(|countdown| countdown.phase() == TimerPhase::Expired)
            {
                self.combined = None;
                events.push(TimerEvent::CombinedExpired);
            }
        }

        events
    }

    /// Drops every countdown.
    pub fn clear(&mut self) {
        self.channels.clear();
        self.combined = None;
    }
}

fn status_of(channel: Channel, countdown: &Countdown) -> TimerStatus {
    TimerStatus {
        channel,
        phase: countdown.phase(),
        remaining_ms: countdown.remaining_ms(),
        target_brightness: countdown.target_brightness(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::TICK;
    use std::time::Duration;

    fn legs(d1: u64, d2: u64) -> [CombinedLeg; 2] {
        [
            CombinedLeg {
                channel: Channel::ONE,
                brightness: 100,
                duration_ms: d1,
            },
            CombinedLeg {
                channel: Channel::TWO,
                brightness: 50,
                duration_ms: d2,
            },
        ]
    }

    #[test]
    fn test_start_and_tick() {
        let now = Instant::now();
        let mut engine = TimerEngine::new();
        engine.start(Channel::ONE, 200, 120_000, now);

        let status = engine.status(Channel::ONE).unwrap();
        assert_eq!(status.remaining_ms, 120_000);
        assert_eq!(status.phase, TimerPhase::Running);
        assert_eq!(engine.next_deadline(), Some(now + TICK));

        assert!(engine.poll(now).is_empty());
        for k in 1..=3u32 {
            let events = engine.poll(now + TICK * k);
            assert_eq!(
                events,
                vec![TimerEvent::Tick {
                    channel: Channel::ONE,
                    remaining_ms: 120_000 - k as u64 * 1000
                }]
            );
        }
    }

    #[test]
    fn test_expiry_removes_timer() {
        let now = Instant::now();
        let mut engine = TimerEngine::new();
        engine.start(Channel::TWO, 255, 1000, now);

        let events = engine.poll(now + TICK);
        assert_eq!(
            events,
            vec![TimerEvent::Expired {
                channel: Channel::TWO
            }]
        );
        assert!(engine.status(Channel::TWO).is_none());
        assert_eq!(engine.next_deadline(), None);
    }

    #[test]
    fn test_channels_are_independent() {
        let now = Instant::now();
        let mut engine = TimerEngine::new();
        engine.start(Channel::ONE, 10, 5000, now);
        engine.start(Channel::TWO, 20, 5000, now + Duration::from_millis(400));
        assert!(engine.pause(Channel::ONE));

        let events = engine.poll(now + Duration::from_millis(1400));
        assert_eq!(
            events,
            vec![TimerEvent::Tick {
                channel: Channel::TWO,
                remaining_ms: 4000
            }]
        );
        assert_eq!(engine.status(Channel::ONE).unwrap().remaining_ms, 5000);
    }

    #[test]
    fn test_pause_resume_reset() {
        let now = Instant::now();
        let mut engine = TimerEngine::new();
        assert!(!engine.pause(Channel::ONE));
        assert!(!engine.reset(Channel::ONE));

        engine.start(Channel::ONE, 10, 5000, now);
        engine.poll(now + TICK);
        assert!(engine.pause(Channel::ONE));
        assert_eq!(engine.next_deadline(), None);
        assert!(engine.poll(now + TICK * 10).is_empty());

        let later = now + TICK * 30;
        assert!(engine.resume(Channel::ONE, later));
        assert_eq!(engine.status(Channel::ONE).unwrap().remaining_ms, 4000);
        assert_eq!(engine.next_deadline(), Some(later + TICK));

        assert!(engine.reset(Channel::ONE));
        let status = engine.status(Channel::ONE).unwrap();
        assert_eq!(status.phase, TimerPhase::Cancelled);
        assert_eq!(status.remaining_ms, 0);
        assert_eq!(engine.next_deadline(), None);
        assert!(engine.poll(later + TICK).is_empty());
        assert!(!engine.reset(Channel::ONE));
        assert!(!engine.resume(Channel::ONE, later));

        engine.start(Channel::ONE, 20, 3000, later);
        assert_eq!(engine.status(Channel::ONE).unwrap().phase, TimerPhase::Running);
    }

    #[test]
    fn test_restart_replaces_timer() {
        let now = Instant::now();
        let mut engine = TimerEngine::new();
        engine.start(Channel::ONE, 10, 5000, now);
        engine.start(Channel::ONE, 99, 60_000, now);
        let status = engine.status(Channel::ONE).unwrap();
        assert_eq!(status.target_brightness, 99);
        assert_eq!(status.remaining_ms, 60_000);
    }

    #[test]
    fn test_combined_fires_once_both_expired() {
        let now = Instant::now();
        let mut engine = TimerEngine::new();
        engine.start_combined(legs(1000, 3000), now);

        let events = engine.poll(now + TICK);
        assert_eq!(
            events,
            vec![
                TimerEvent::LegExpired {
                    channel: Channel::ONE
                },
                TimerEvent::Tick {
                    channel: Channel::TWO,
                    remaining_ms: 2000
                },
            ]
        );

        let legs = engine.combined_status().unwrap();
        assert_eq!(legs[0].phase, TimerPhase::Expired);
        assert_eq!(legs[0].remaining_ms, 0);

        let events = engine.poll(now + TICK * 2);
        assert_eq!(
            events,
            vec![TimerEvent::Tick {
                channel: Channel::TWO,
                remaining_ms: 1000
            }]
        );

        let events = engine.poll(now + TICK * 3);
        assert_eq!(
            events,
            vec![
                TimerEvent::LegExpired {
                    channel: Channel::TWO
                },
                TimerEvent::CombinedExpired
            ]
        );
        assert!(engine.combined_status().is_none());
    }

    #[test]
    fn test_combined_pause_resume_reset() {
        let now = Instant::now();
        let mut engine = TimerEngine::new();
        assert!(!engine.pause_combined());
        assert!(engine.reset_combined().is_empty());

        engine.start_combined(legs(5000, 5000), now);
        assert!(engine.pause_combined());
        assert!(engine.poll(now + TICK).is_empty());
        assert!(engine.resume_combined(now + TICK * 4));
        assert_eq!(engine.next_deadline(), Some(now + TICK * 5));

        assert_eq!(engine.reset_combined(), vec![Channel::ONE, Channel::TWO]);
        assert!(engine.combined_status().is_none());
    }

    #[test]
    fn test_combined_and_channel_timers_coexist() {
        let now = Instant::now();
        let mut engine = TimerEngine::new();
        engine.start(Channel::ONE, 10, 10_000, now);
        engine.start_combined(legs(10_000, 10_000), now);

        let events = engine.poll(now + TICK);
        assert_eq!(events.len(), 3);
        engine.clear();
        assert_eq!(engine.next_deadline(), None);
    }
}
