//! Per-channel brightness state.

use crate::events::BrightnessSource;
use led_dimmer_hw::{Channel, ChannelMode};
use std::collections::BTreeMap;

/// Authoritative brightness of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelState {
    /// Last brightness written or reported.
    pub brightness: u8,
    /// Where that value came from; `None` until the first change.
    pub source: Option<BrightnessSource>,
}

/// Channel states indexed by channel.
#[derive(Debug, Clone)]
pub struct ChannelTable {
    states: BTreeMap<Channel, ChannelState>,
}

impl ChannelTable {
    /// Creates a table with every channel of `mode` at brightness 0.
    pub fn new(mode: ChannelMode) -> Self {
        let states = mode
            .channels()
            .iter()
            .map(|channel| {
                (
                    *channel,
                    ChannelState {
                        brightness: 0,
                        source: None,
                    },
                )
            })
            .collect();
        Self { states }
    }

    /// Records a new brightness. Returns false for a channel not in the table.
    pub fn set(&mut self, channel: Channel, brightness: u8, source: BrightnessSource) -> bool {
        match self.states.get_mut(&channel) {
            Some(state) => {
                state.brightness = brightness;
                state.source = Some(source);
                true
            }
            None => false,
        }
    }

    /// Iterates over all channels in order.
    pub fn iter(&self) -> impl Iterator<Item = (Channel, ChannelState)> + '_ {
        self.states.iter().map(|(channel, state)| (*channel, *state))
    }
}
