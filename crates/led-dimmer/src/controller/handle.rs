//! Dispatcher task and the handle the UI drives it through.
//!
//! The dispatcher is the single sequencing point: it drains UI requests,
//! telemetry events and timer deadlines one at a time, so the controller's
//! state is only ever touched from this task.

use super::{CombinedTimerRequest, Controller, Status};
use crate::error::{ControlError, ValidationError};
use crate::events::UiEvent;
use crate::timer::TimerPhase;
use led_dimmer_hw::{ChannelMode, LinkEvent, SerialSettings};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Pending UI requests.
const REQUEST_QUEUE: usize = 32;

/// Pending telemetry events.
const LINK_QUEUE: usize = 64;

type Reply<T> = oneshot::Sender<T>;

/// A request from the UI, answered on its reply channel.
enum Request {
    Connect {
        port: String,
        reply: Reply<led_dimmer_hw::Result<()>>,
    },
    #[cfg(test)]
    Attach {
        port: String,
        stream: tokio::io::DuplexStream,
        reply: Reply<()>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    SetBrightness {
        channel: u8,
        raw: String,
        reply: Reply<Result<u8, ValidationError>>,
    },
    StartTimer {
        channel: u8,
        brightness: String,
        duration: String,
        reply: Reply<Result<(), ValidationError>>,
    },
    PauseTimer {
        channel: u8,
        reply: Reply<Result<bool, ValidationError>>,
    },
    ResumeTimer {
        channel: u8,
        reply: Reply<Result<bool, ValidationError>>,
    },
    ToggleTimer {
        channel: u8,
        reply: Reply<Result<TimerPhase, ValidationError>>,
    },
    ResetTimer {
        channel: u8,
        reply: Reply<Result<(), ValidationError>>,
    },
    StartCombined {
        request: CombinedTimerRequest,
        reply: Reply<Result<(), ValidationError>>,
    },
    PauseCombined {
        reply: Reply<bool>,
    },
    ResumeCombined {
        reply: Reply<bool>,
    },
    ResetCombined {
        reply: Reply<()>,
    },
    Status {
        reply: Reply<Status>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Cloneable handle to the dispatcher task.
#[derive(Clone)]
pub struct ControllerHandle {
    requests: mpsc::Sender<Request>,
    events: broadcast::Sender<UiEvent>,
}

/// Creates a controller and spawns its dispatcher on the current runtime.
pub fn spawn(
    mode: ChannelMode,
    settings: SerialSettings,
    event_capacity: usize,
) -> (ControllerHandle, JoinHandle<()>) {
    let (events, _) = broadcast::channel(event_capacity.max(1));
    let (link_tx, link_rx) = mpsc::channel(LINK_QUEUE);
    let (requests, request_rx) = mpsc::channel(REQUEST_QUEUE);

    let controller = Controller::new(mode, settings, link_tx, events.clone());
    let task = tokio::spawn(run(controller, request_rx, link_rx));

    (ControllerHandle { requests, events }, task)
}

async fn run(
    mut controller: Controller,
    mut requests: mpsc::Receiver<Request>,
    mut link_rx: mpsc::Receiver<LinkEvent>,
) {
    loop {
        let deadline = controller.next_timer_deadline();
        tokio::select! {
            request = requests.recv() => match request {
                Some(Request::Shutdown { reply }) => {
                    controller.shutdown().await;
                    let _ = reply.send(());
                    return;
                }
                Some(request) => dispatch(&mut controller, request).await,
                None => {
                    debug!("All controller handles dropped");
                    controller.shutdown().await;
                    return;
                }
            },
            Some(event) = link_rx.recv() => controller.on_link_event(event).await,
            _ = wait_until(deadline) => controller.on_timer_due(Instant::now()).await,
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn dispatch(controller: &mut Controller, request: Request) {
    // A dropped reply receiver just means the caller stopped waiting.
    match request {
        Request::Connect { port, reply } => {
            let _ = reply.send(controller.connect(&port).await);
        }
        #[cfg(test)]
        Request::Attach {
            port,
            stream,
            reply,
        } => {
            controller.attach(&port, stream).await;
            let _ = reply.send(());
        }
        Request::Disconnect { reply } => {
            controller.disconnect().await;
            let _ = reply.send(());
        }
        Request::SetBrightness {
            channel,
            raw,
            reply,
        } => {
            let _ = reply.send(controller.set_brightness(channel, &raw).await);
        }
        Request::StartTimer {
            channel,
            brightness,
            duration,
            reply,
        } => {
            let _ = reply.send(
                controller
                    .start_timer(channel, &brightness, &duration)
                    .await,
            );
        }
        Request::PauseTimer { channel, reply } => {
            let _ = reply.send(controller.pause_timer(channel));
        }
        Request::ResumeTimer { channel, reply } => {
            let _ = reply.send(controller.resume_timer(channel));
        }
        Request::ToggleTimer { channel, reply } => {
            let _ = reply.send(controller.toggle_timer(channel));
        }
        Request::ResetTimer { channel, reply } => {
            let _ = reply.send(controller.reset_timer(channel).await);
        }
        Request::StartCombined { request, reply } => {
            let _ = reply.send(controller.start_combined_timer(&request).await);
        }
        Request::PauseCombined { reply } => {
            let _ = reply.send(controller.pause_combined_timer());
        }
        Request::ResumeCombined { reply } => {
            let _ = reply.send(controller.resume_combined_timer());
        }
        Request::ResetCombined { reply } => {
            controller.reset_combined_timer().await;
            let _ = reply.send(());
        }
        Request::Status { reply } => {
            let _ = reply.send(controller.status());
        }
        Request::Shutdown { reply } => {
            controller.shutdown().await;
            let _ = reply.send(());
        }
    }
}

impl ControllerHandle {
    /// Subscribes to UI events.
    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    async fn call<T>(&self, request: impl FnOnce(Reply<T>) -> Request) -> Result<T, ControlError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(request(reply))
            .await
            .map_err(|_| ControlError::Stopped)?;
        response.await.map_err(|_| ControlError::Stopped)
    }

    /// Opens a serial port.
    pub async fn connect(&self, port: &str) -> Result<(), ControlError> {
        let port = port.to_string();
        self.call(|reply| Request::Connect { port, reply }).await??;
        Ok(())
    }

    #[cfg(test)]
    async fn attach(&self, port: &str, stream: tokio::io::DuplexStream) -> Result<(), ControlError> {
        let port = port.to_string();
        self.call(|reply| Request::Attach {
            port,
            stream,
            reply,
        })
        .await
    }

    /// Closes the serial port.
    pub async fn disconnect(&self) -> Result<(), ControlError> {
        self.call(|reply| Request::Disconnect { reply }).await
    }

    /// Sets a channel's brightness from raw text. Returns the clamped value.
    pub async fn set_brightness(&self, channel: u8, raw: &str) -> Result<u8, ControlError> {
        let raw = raw.to_string();
        Ok(self
            .call(|reply| Request::SetBrightness {
                channel,
                raw,
                reply,
            })
            .await??)
    }

    /// Starts a channel's timer.
    pub async fn start_timer(
        &self,
        channel: u8,
        brightness: &str,
        duration: &str,
    ) -> Result<(), ControlError> {
        let brightness = brightness.to_string();
        let duration = duration.to_string();
        Ok(self
            .call(|reply| Request::StartTimer {
                channel,
                brightness,
                duration,
                reply,
            })
            .await??)
    }

    /// Pauses a channel's timer.
    pub async fn pause_timer(&self, channel: u8) -> Result<bool, ControlError> {
        Ok(self
            .call(|reply| Request::PauseTimer { channel, reply })
            .await??)
    }

    /// Resumes a channel's timer.
    pub async fn resume_timer(&self, channel: u8) -> Result<bool, ControlError> {
        Ok(self
            .call(|reply| Request::ResumeTimer { channel, reply })
            .await??)
    }

    /// Pauses or resumes a channel's timer.
    pub async fn toggle_timer(&self, channel: u8) -> Result<TimerPhase, ControlError> {
        Ok(self
            .call(|reply| Request::ToggleTimer { channel, reply })
            .await??)
    }

    /// Cancels a channel's timer and turns the channel off.
    pub async fn reset_timer(&self, channel: u8) -> Result<(), ControlError> {
        Ok(self
            .call(|reply| Request::ResetTimer { channel, reply })
            .await??)
    }

    /// Starts the combined timer.
    pub async fn start_combined_timer(
        &self,
        request: CombinedTimerRequest,
    ) -> Result<(), ControlError> {
        Ok(self
            .call(|reply| Request::StartCombined { request, reply })
            .await??)
    }

    /// Pauses the combined timer.
    pub async fn pause_combined_timer(&self) -> Result<bool, ControlError> {
        self.call(|reply| Request::PauseCombined { reply }).await
    }

    /// Resumes the combined timer.
    pub async fn resume_combined_timer(&self) -> Result<bool, ControlError> {
        self.call(|reply| Request::ResumeCombined { reply }).await
    }

    /// Cancels the combined timer and turns both channels off.
    pub async fn reset_combined_timer(&self) -> Result<(), ControlError> {
        self.call(|reply| Request::ResetCombined { reply }).await
    }

    /// Returns a status snapshot.
    pub async fn status(&self) -> Result<Status, ControlError> {
        self.call(|reply| Request::Status { reply }).await
    }

    /// Stops timers, closes the port and ends the dispatcher.
    pub async fn shutdown(&self) -> Result<(), ControlError> {
        self.call(|reply| Request::Shutdown { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::TICK;
    use led_dimmer_hw::Channel;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    async fn next_matching(
        events: &mut broadcast::Receiver<UiEvent>,
        wanted: impl Fn(&UiEvent) -> bool,
    ) -> UiEvent {
        loop {
            let event = events.recv().await.unwrap();
            if wanted(&event) {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_expires_through_dispatcher() {
        let (handle, task) = spawn(ChannelMode::Dual, SerialSettings::default(), 64);
        let mut events = handle.subscribe();
        let (local, remote) = tokio::io::duplex(1024);
        let mut device = BufReader::new(remote);
        handle.attach("loopback", local).await.unwrap();

        handle.start_timer(1, "200", "0.0167").await.unwrap();
        let mut line = String::new();
        device.read_line(&mut line).await.unwrap();
        assert_eq!(line, "SET1:200\n");

        // Paused time auto-advances to the tick deadline.
        let expired = next_matching(&mut events, |e| matches!(e, UiEvent::TimerExpired(_))).await;
        assert_eq!(expired, UiEvent::TimerExpired(Channel::ONE));

        line.clear();
        device.read_line(&mut line).await.unwrap();
        assert_eq!(line, "SET1:0\n");
        assert_eq!(handle.status().await.unwrap().channels[0].brightness, 0);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_telemetry_reaches_ui() {
        let (handle, task) = spawn(ChannelMode::Dual, SerialSettings::default(), 64);
        let mut events = handle.subscribe();
        let (local, mut remote) = tokio::io::duplex(1024);
        handle.attach("loopback", local).await.unwrap();

        remote.write_all(b"garbage\nBRIGHTNESS2:33\n").await.unwrap();
        let event = next_matching(&mut events, |e| {
            matches!(e, UiEvent::BrightnessChanged { .. })
        })
        .await;
        assert_eq!(
            event,
            UiEvent::BrightnessChanged {
                channel: Channel::TWO,
                value: 33,
                source: crate::events::BrightnessSource::Telemetry
            }
        );

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_validation_error_through_handle() {
        let (handle, task) = spawn(ChannelMode::Single, SerialSettings::default(), 8);
        let err = handle.set_brightness(2, "10").await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::Validation(ValidationError::UnknownChannel(2))
        ));
        assert_eq!(handle.set_brightness(1, "999").await.unwrap(), 255);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(matches!(handle.status().await, Err(ControlError::Stopped)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_holds_remaining_time() {
        let (handle, task) = spawn(ChannelMode::Dual, SerialSettings::default(), 64);
        handle.start_timer(2, "10", "1").await.unwrap();

        tokio::time::sleep(TICK * 2 + Duration::from_millis(500)).await;
        assert!(handle.pause_timer(2).await.unwrap());
        let remaining = handle.status().await.unwrap().channels[1]
            .timer
            .unwrap()
            .remaining_ms;
        assert_eq!(remaining, 58_000);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(handle.resume_timer(2).await.unwrap());
        let timer = handle.status().await.unwrap().channels[1].timer.unwrap();
        assert_eq!(timer.remaining_ms, 58_000);
        assert_eq!(timer.phase, TimerPhase::Running);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
