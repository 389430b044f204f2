//! Device controller.
//!
//! Reconciles manual input, device telemetry and timer ticks against one
//! brightness state per channel, and serializes every outbound write through
//! the transport. All mutation happens on the dispatcher task (see
//! [`handle`]); the telemetry listener only publishes into its queue.

mod handle;

pub use handle::{spawn, ControllerHandle};

use crate::error::ValidationError;
use crate::events::{BrightnessSource, UiEvent};
use crate::input::{format_remaining, parse_duration_ms, parse_manual_brightness, parse_timer_brightness};
use crate::state::ChannelTable;
use crate::timer::{CombinedLeg, TimerEngine, TimerEvent, TimerPhase, TimerStatus};
use led_dimmer_hw::{
    encode_set, Channel, ChannelMode, ConnectionState, Error as DeviceError, LinkEvent, LinkId,
    LinkReader, SerialSettings, Telemetry, TelemetryListener, Transport,
};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Raw combined-timer input as entered in the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombinedTimerRequest {
    pub brightness1: String,
    /// Ignored when `sync_brightness` is set.
    pub brightness2: Option<String>,
    pub duration1: String,
    /// Ignored when `sync_duration` is set.
    pub duration2: Option<String>,
    pub sync_brightness: bool,
    pub sync_duration: bool,
}

/// Brightness and timer of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    pub channel: Channel,
    pub brightness: u8,
    pub source: Option<BrightnessSource>,
    pub timer: Option<TimerStatus>,
}

/// Snapshot of everything the UI displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub mode: ChannelMode,
    pub connection: ConnectionState,
    pub channels: Vec<ChannelStatus>,
    pub combined: Option<Vec<TimerStatus>>,
}

/// Owns the transport, channel states and timers.
pub struct Controller {
    mode: ChannelMode,
    transport: Transport,
    listener: Option<TelemetryListener>,
    next_link: LinkId,
    link_tx: mpsc::Sender<LinkEvent>,
    channels: ChannelTable,
    timers: TimerEngine,
    events: broadcast::Sender<UiEvent>,
}

impl Controller {
    /// Creates a disconnected controller.
    pub fn new(
        mode: ChannelMode,
        settings: SerialSettings,
        link_tx: mpsc::Sender<LinkEvent>,
        events: broadcast::Sender<UiEvent>,
    ) -> Self {
        Self {
            mode,
            transport: Transport::new(settings),
            listener: None,
            next_link: 0,
            link_tx,
            channels: ChannelTable::new(mode),
            timers: TimerEngine::new(),
            events,
        }
    }

    /// Opens a serial port and starts listening for telemetry.
    pub async fn connect(&mut self, port: &str) -> led_dimmer_hw::Result<()> {
        self.disconnect().await;

        match self.transport.connect(port) {
            Ok(reader) => {
                self.start_listener(reader);
                self.emit(UiEvent::Connected(port.to_string()));
                Ok(())
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}", port, e);
                self.emit(UiEvent::ConnectionError(e.to_string()));
                Err(e)
            }
        }
    }

    /// Uses an in-memory stream in place of a serial port.
    #[cfg(test)]
    pub(crate) async fn attach<S>(&mut self, port: &str, stream: S)
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
    {
        self.disconnect().await;
        let reader = self.transport.attach(port, stream);
        self.start_listener(reader);
        self.emit(UiEvent::Connected(port.to_string()));
    }

    fn start_listener(&mut self, reader: LinkReader) {
        self.next_link += 1;
        self.listener = Some(TelemetryListener::spawn(
            self.next_link,
            reader,
            self.mode,
            self.link_tx.clone(),
        ));
    }

    /// Stops the listener and closes the port. Safe to call when closed.
    pub async fn disconnect(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.stop().await;
        }
        if self.transport.is_open() {
            self.transport.disconnect();
            self.emit(UiEvent::Disconnected);
        }
    }

    /// Sets a channel's brightness from raw text, saturating into 0..=255.
    ///
    /// Returns the value actually applied.
    pub async fn set_brightness(&mut self, channel: u8, raw: &str) -> Result<u8, ValidationError> {
        let channel = self.channel(channel)?;
        let value = parse_manual_brightness(raw)?;
        self.write_brightness(channel, value, BrightnessSource::Manual)
            .await;
        Ok(value)
    }

    /// Starts a channel's timer: sets `brightness` now and 0 when it runs out.
    pub async fn start_timer(
        &mut self,
        channel: u8,
        brightness: &str,
        duration: &str,
    ) -> Result<(), ValidationError> {
        let channel = self.channel(channel)?;
        let brightness = parse_timer_brightness(brightness)?;
        let duration_ms = parse_duration_ms(duration)?;

        self.timers
            .start(channel, brightness, duration_ms, Instant::now());
        info!(
            "LED {} timer started: brightness {} for {}",
            channel,
            brightness,
            format_remaining(duration_ms)
        );

        self.write_brightness(channel, brightness, BrightnessSource::Timer)
            .await;
        self.emit(UiEvent::TimerTick {
            channel,
            remaining_ms: duration_ms,
        });
        Ok(())
    }

    /// Pauses a channel's timer. Returns false if it was not running.
    pub fn pause_timer(&mut self, channel: u8) -> Result<bool, ValidationError> {
        let channel = self.channel(channel)?;
        let paused = self.timers.pause(channel);
        if paused {
            info!("LED {} timer paused", channel);
        }
        Ok(paused)
    }

    /// Resumes a paused timer. Returns false if it was not paused.
    pub fn resume_timer(&mut self, channel: u8) -> Result<bool, ValidationError> {
        let channel = self.channel(channel)?;
        let resumed = self.timers.resume(channel, Instant::now());
        if resumed {
            info!("LED {} timer resumed", channel);
        }
        Ok(resumed)
    }

    /// Pauses a running timer or resumes a paused one. Returns the new phase.
    pub fn toggle_timer(&mut self, channel: u8) -> Result<TimerPhase, ValidationError> {
        let id = channel;
        let channel = self.channel(id)?;
        match self.timers.status(channel).map(|status| status.phase) {
            Some(TimerPhase::Running) => self.pause_timer(id).map(|_| TimerPhase::Paused),
            Some(TimerPhase::Paused) => self.resume_timer(id).map(|_| TimerPhase::Running),
            Some(phase) => Ok(phase),
            None => Ok(TimerPhase::Idle),
        }
    }

    /// Cancels a channel's timer and forces the channel to 0.
    pub async fn reset_timer(&mut self, channel: u8) -> Result<(), ValidationError> {
        let channel = self.channel(channel)?;
        if self.timers.reset(channel) {
            info!("LED {} timer reset", channel);
        }
        self.write_brightness(channel, 0, BrightnessSource::Timer)
            .await;
        self.emit(UiEvent::TimerTick {
            channel,
            remaining_ms: 0,
        });
        Ok(())
    }

    /// Starts the combined timer over both channels.
    ///
    /// Sync flags copy channel 1's input to channel 2 at start time only.
    pub async fn start_combined_timer(
        &mut self,
        request: &CombinedTimerRequest,
    ) -> Result<(), ValidationError> {
        if self.mode != ChannelMode::Dual {
            return Err(ValidationError::UnknownChannel(Channel::TWO.id()));
        }

        let brightness1 = parse_timer_brightness(&request.brightness1)?;
        let brightness2 = if request.sync_brightness {
            brightness1
        } else {
            let raw = request
                .brightness2
                .as_deref()
                .ok_or(ValidationError::MissingValue("brightness for LED 2"))?;
            parse_timer_brightness(raw)?
        };
        let duration1 = parse_duration_ms(&request.duration1)?;
        let duration2 = if request.sync_duration {
            duration1
        } else {
            let raw = request
                .duration2
                .as_deref()
                .ok_or(ValidationError::MissingValue("timer duration for LED 2"))?;
            parse_duration_ms(raw)?
        };

        let legs = [
            CombinedLeg {
                channel: Channel::ONE,
                brightness: brightness1,
                duration_ms: duration1,
            },
            CombinedLeg {
                channel: Channel::TWO,
                brightness: brightness2,
                duration_ms: duration2,
            },
        ];

        // Per-channel countdowns would fight the combined writes.
        for leg in &legs {
            if self.timers.reset(leg.channel) {
                debug!("LED {} timer replaced by combined timer", leg.channel);
            }
        }
        self.timers.start_combined(legs, Instant::now());
        info!(
            "Combined timer started: LED 1 {} for {}, LED 2 {} for {}",
            brightness1,
            format_remaining(duration1),
            brightness2,
            format_remaining(duration2)
        );

        for leg in legs {
            self.write_brightness(leg.channel, leg.brightness, BrightnessSource::Timer)
                .await;
            self.emit(UiEvent::TimerTick {
                channel: leg.channel,
                remaining_ms: leg.duration_ms,
            });
        }
        Ok(())
    }

    /// Pauses the combined timer. Returns false if nothing was running.
    pub fn pause_combined_timer(&mut self) -> bool {
        let paused = self.timers.pause_combined();
        if paused {
            info!("Combined timer paused");
        }
        paused
    }

    /// Resumes the combined timer. Returns false if nothing was paused.
    pub fn resume_combined_timer(&mut self) -> bool {
        let resumed = self.timers.resume_combined(Instant::now());
        if resumed {
            info!("Combined timer resumed");
        }
        resumed
    }

    /// Cancels the combined timer and forces both channels to 0.
    pub async fn reset_combined_timer(&mut self) {
        if self.mode != ChannelMode::Dual {
            return;
        }
        if !self.timers.reset_combined().is_empty() {
            info!("Combined timer reset");
        }
        for channel in [Channel::ONE, Channel::TWO] {
            self.write_brightness(channel, 0, BrightnessSource::Timer)
                .await;
            self.emit(UiEvent::TimerTick {
                channel,
                remaining_ms: 0,
            });
        }
    }

    /// Applies an event from the telemetry listener.
    pub async fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Telemetry { link, telemetry } if self.is_current(link) => {
                // Telemetry never triggers an outbound write.
                let Telemetry { channel, brightness } = telemetry;
                if self
                    .channels
                    .set(channel, brightness, BrightnessSource::Telemetry)
                {
                    self.emit(UiEvent::BrightnessChanged {
                        channel,
                        value: brightness,
                        source: BrightnessSource::Telemetry,
                    });
                }
            }
            LinkEvent::Lost { link, reason } if self.is_current(link) => {
                warn!("Serial link lost: {}", reason);
                self.emit(UiEvent::ConnectionError(reason));
                self.disconnect().await;
            }
            stale => debug!("Ignoring event from a closed link: {:?}", stale),
        }
    }

    /// Applies every timer tick due at `now`.
    pub async fn on_timer_due(&mut self, now: Instant) {
        for event in self.timers.poll(now) {
            match event {
                TimerEvent::Tick {
                    channel,
                    remaining_ms,
                } => self.emit(UiEvent::TimerTick {
                    channel,
                    remaining_ms,
                }),
                TimerEvent::Expired { channel } => {
                    info!("LED {} timer finished", channel);
                    self.write_brightness(channel, 0, BrightnessSource::Timer)
                        .await;
                    self.emit(UiEvent::TimerTick {
                        channel,
                        remaining_ms: 0,
                    });
                    self.emit(UiEvent::TimerExpired(channel));
                }
                TimerEvent::LegExpired { channel } => {
                    debug!("Combined timer: LED {} finished", channel);
                    self.write_brightness(channel, 0, BrightnessSource::Timer)
                        .await;
                    self.emit(UiEvent::TimerTick {
                        channel,
                        remaining_ms: 0,
                    });
                }
                TimerEvent::CombinedExpired => {
                    info!("Combined timer finished");
                    self.emit(UiEvent::CombinedTimerExpired);
                }
            }
        }
    }

    /// When the next timer tick is due.
    pub fn next_timer_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Returns a snapshot for display.
    pub fn status(&self) -> Status {
        Status {
            mode: self.mode,
            connection: self.transport.state(),
            channels: self
                .channels
                .iter()
                .map(|(channel, state)| ChannelStatus {
                    channel,
                    brightness: state.brightness,
                    source: state.source,
                    timer: self.timers.status(channel),
                })
                .collect(),
            combined: self.timers.combined_status(),
        }
    }

    /// Drops every timer and closes the connection.
    pub async fn shutdown(&mut self) {
        self.timers.clear();
        self.disconnect().await;
        info!("Controller stopped");
    }

    /// Records a brightness, tells the UI and sends it to the device.
    ///
    /// A failed write keeps the local value so the UI stays consistent.
    async fn write_brightness(&mut self, channel: Channel, value: u8, source: BrightnessSource) {
        self.channels.set(channel, value, source);
        self.emit(UiEvent::BrightnessChanged {
            channel,
            value,
            source,
        });

        let line = encode_set(self.mode, channel, value);
        match self.transport.send_line(&line).await {
            Ok(()) => {}
            Err(DeviceError::NotConnected) => {
                debug!("Not connected; LED {} brightness {} kept locally", channel, value);
            }
            Err(e) => {
                warn!("Failed to send {:?}: {}", line, e);
                self.emit(UiEvent::ConnectionError(e.to_string()));
            }
        }
    }

    fn channel(&self, id: u8) -> Result<Channel, ValidationError> {
        self.mode
            .channel(id)
            .ok_or(ValidationError::UnknownChannel(id))
    }

    fn is_current(&self, link: LinkId) -> bool {
        self.listener
            .as_ref()
            .is_some_and(|listener| listener.link() == link)
    }

    fn emit(&self, event: UiEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
