//! Background telemetry listener.

use crate::channel::ChannelMode;
use crate::protocol::{parse_telemetry, Telemetry};
use crate::serial::LinkReader;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Longest frame kept, newline included. Longer lines are discarded.
const MAX_LINE_LEN: usize = 128;

/// Identifies one connection, so events from a previous link can be told apart.
pub type LinkId = u64;

/// Event published by the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A brightness report from the device.
    Telemetry { link: LinkId, telemetry: Telemetry },
    /// The link failed or reached end of stream.
    Lost { link: LinkId, reason: String },
}

/// How the listener task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerExit {
    /// Stopped on request.
    Stopped,
    /// The device closed the stream.
    Closed,
    /// A read failed.
    Failed(String),
}

/// Reads frames from the link on its own task and publishes recognised ones.
pub struct TelemetryListener {
    link: LinkId,
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<ListenerExit>,
}

impl TelemetryListener {
    /// Spawns the listener task on the current runtime.
    pub fn spawn(
        link: LinkId,
        reader: LinkReader,
        mode: ChannelMode,
        events: mpsc::Sender<LinkEvent>,
    ) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(listen(link, reader, mode, events, stop_rx));
        debug!("Telemetry listener {} started ({} mode)", link, mode);
        Self {
            link,
            stop_tx,
            handle,
        }
    }

    /// Returns the link this listener reads from.
    pub fn link(&self) -> LinkId {
        self.link
    }

    /// Signals the task to stop and waits for it to release the reader.
    pub async fn stop(self) -> ListenerExit {
        let _ = self.stop_tx.send(());
        let exit = self
            .handle
            .await
            .unwrap_or_else(|e| ListenerExit::Failed(e.to_string()));
        debug!("Telemetry listener {} ended: {:?}", self.link, exit);
        exit
    }
}

async fn listen(
    link: LinkId,
    reader: LinkReader,
    mode: ChannelMode,
    events: mpsc::Sender<LinkEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) -> ListenerExit {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(64);
    // Set while skipping the rest of an oversized line.
    let mut overflowed = false;

    loop {
        buf.clear();
        let mut limited = (&mut reader).take(MAX_LINE_LEN as u64);
        let read = tokio::select! {
            biased;
            _ = &mut stop_rx => return ListenerExit::Stopped,
            read = limited.read_until(b'\n', &mut buf) => read,
        };

        if matches!(read, Ok(n) if n > 0) {
            let complete = buf.last() == Some(&b'\n');
            if !complete && buf.len() >= MAX_LINE_LEN {
                if !overflowed {
                    debug!("Discarding oversized line on link {}", link);
                }
                overflowed = true;
                continue;
            }
            if overflowed {
                overflowed = !complete;
                continue;
            }
        }

        let event = match read {
            Ok(0) => {
                let reason = "device closed the connection".to_string();
                warn!("Serial link {}: {}", link, reason);
                publish(&events, &mut stop_rx, LinkEvent::Lost { link, reason }).await;
                return ListenerExit::Closed;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                match parse_telemetry(&line, mode) {
                    Some(telemetry) => LinkEvent::Telemetry { link, telemetry },
                    None => {
                        debug!("Discarding line: {:?}", line.trim_end());
                        continue;
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                let reason = format!("read failed: {}", e);
                warn!("Serial link {}: {}", link, reason);
                publish(&events, &mut stop_rx, LinkEvent::Lost { link, reason }).await;
                return ListenerExit::Failed(e.to_string());
            }
        };

        if !publish(&events, &mut stop_rx, event).await {
            return ListenerExit::Stopped;
        }
    }
}

/// Sends an event unless a stop arrives first. Returns false if the listener should end.
async fn publish(
    events: &mpsc::Sender<LinkEvent>,
    stop_rx: &mut oneshot::Receiver<()>,
    event: LinkEvent,
) -> bool {
    tokio::select! {
        biased;
        _ = stop_rx => false,
        sent = events.send(event) => sent.is_ok(),
    }
}
