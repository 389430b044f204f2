//! Line-oriented console that drives the controller from stdin.

use crate::controller::{CombinedTimerRequest, ControllerHandle, Status};
use crate::error::ControlError;
use crate::input::format_remaining;
use crate::timer::TimerStatus;
use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

const HELP: &str = "\
Commands:
  ports                                   list serial ports
  connect <port>                          open a serial port
  disconnect                              close the serial port
  set <led> <0-255>                       set brightness
  timer <led> <0-255> <minutes>           start a timer
  pause <led> | resume <led> | toggle <led>
  reset <led>                             cancel timer, brightness 0
  combined start <b1> <b2|-> <m1> <m2|-> [sync-brightness] [sync-duration]
  combined pause | resume | reset
  status
  help
  quit";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Ports,
    Connect(String),
    Disconnect,
    Set { channel: u8, value: String },
    Timer {
        channel: u8,
        brightness: String,
        duration: String,
    },
    Pause(u8),
    Resume(u8),
    Toggle(u8),
    Reset(u8),
    CombinedStart(CombinedTimerRequest),
    CombinedPause,
    CombinedResume,
    CombinedReset,
    Status,
    Help,
    Quit,
}

/// Parses one console line. The error is a usage hint.
pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let command = match words.as_slice() {
        ["ports"] => ConsoleCommand::Ports,
        ["connect", port] => ConsoleCommand::Connect(port.to_string()),
        ["disconnect"] => ConsoleCommand::Disconnect,
        ["set", led, value] => ConsoleCommand::Set {
            channel: parse_led(led)?,
            value: value.to_string(),
        },
        ["timer", led, brightness, duration] => ConsoleCommand::Timer {
            channel: parse_led(led)?,
            brightness: brightness.to_string(),
            duration: duration.to_string(),
        },
        ["pause", led] => ConsoleCommand::Pause(parse_led(led)?),
        ["resume", led] => ConsoleCommand::Resume(parse_led(led)?),
        ["toggle", led] => ConsoleCommand::Toggle(parse_led(led)?),
        ["reset", led] => ConsoleCommand::Reset(parse_led(led)?),
        ["combined", "start", b1, b2, d1, d2, flags @ ..] => {
            let mut request = CombinedTimerRequest {
                brightness1: b1.to_string(),
                brightness2: optional(b2),
                duration1: d1.to_string(),
                duration2: optional(d2),
                ..Default::default()
            };
            for flag in flags {
                match *flag {
                    "sync-brightness" => request.sync_brightness = true,
                    "sync-duration" => request.sync_duration = true,
                    other => return Err(format!("Unknown combined timer option: {}", other)),
                }
            }
            ConsoleCommand::CombinedStart(request)
        }
        ["combined", "pause"] => ConsoleCommand::CombinedPause,
        ["combined", "resume"] => ConsoleCommand::CombinedResume,
        ["combined", "reset"] => ConsoleCommand::CombinedReset,
        ["status"] => ConsoleCommand::Status,
        ["help"] | ["?"] => ConsoleCommand::Help,
        ["quit"] | ["exit"] => ConsoleCommand::Quit,
        _ => return Err(format!("Unrecognised command: {:?}\n{}", line.trim(), HELP)),
    };
    Ok(command)
}

fn parse_led(word: &str) -> Result<u8, String> {
    word.parse()
        .map_err(|_| format!("LED must be a number, got {:?}", word))
}

fn optional(word: &str) -> Option<String> {
    (word != "-").then(|| word.to_string())
}

/// Reads commands from stdin until `quit` or end of input, printing UI events as they arrive.
pub async fn run(handle: ControllerHandle) -> Result<()> {
    let mut events = handle.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{}", event),
                Err(RecvError::Lagged(skipped)) => warn!("Console fell behind, {} events skipped", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(ConsoleCommand::Quit) => break,
            Ok(command) => match execute(&handle, command).await {
                Ok(()) => {}
                Err(ControlError::Stopped) => break,
                Err(e) => println!("{}", e),
            },
            Err(usage) => println!("{}", usage),
        }
    }

    printer.abort();
    Ok(())
}

async fn execute(handle: &ControllerHandle, command: ConsoleCommand) -> Result<(), ControlError> {
    match command {
        ConsoleCommand::Ports => match led_dimmer_hw::list_available_ports() {
            Ok(ports) if ports.is_empty() => println!("No serial ports found"),
            Ok(ports) => ports.iter().for_each(|port| println!("{}", port)),
            Err(e) => println!("Failed to list ports: {}", e),
        },
        ConsoleCommand::Connect(port) => handle.connect(&port).await?,
        ConsoleCommand::Disconnect => handle.disconnect().await?,
        ConsoleCommand::Set { channel, value } => {
            handle.set_brightness(channel, &value).await?;
        }
        ConsoleCommand::Timer {
            channel,
            brightness,
            duration,
        } => handle.start_timer(channel, &brightness, &duration).await?,
        ConsoleCommand::Pause(channel) => {
            if !handle.pause_timer(channel).await? {
                println!("LED {} has no running timer", channel);
            }
        }
        ConsoleCommand::Resume(channel) => {
            if !handle.resume_timer(channel).await? {
                println!("LED {} has no paused timer", channel);
            }
        }
        ConsoleCommand::Toggle(channel) => {
            let phase = handle.toggle_timer(channel).await?;
            println!("LED {} timer {}", channel, phase);
        }
        ConsoleCommand::Reset(channel) => handle.reset_timer(channel).await?,
        ConsoleCommand::CombinedStart(request) => handle.start_combined_timer(request).await?,
        ConsoleCommand::CombinedPause => {
            if !handle.pause_combined_timer().await? {
                println!("Combined timer is not running");
            }
        }
        ConsoleCommand::CombinedResume => {
            if !handle.resume_combined_timer().await? {
                println!("Combined timer is not paused");
            }
        }
        ConsoleCommand::CombinedReset => handle.reset_combined_timer().await?,
        ConsoleCommand::Status => print!("{}", render_status(&handle.status().await?)),
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}

/// Renders a status snapshot as text.
pub fn render_status(status: &Status) -> String {
    let mut out = match &status.connection.port {
        Some(port) if status.connection.open => format!("Connected to {} ({} mode)\n", port, status.mode),
        _ => format!("Not connected ({} mode)\n", status.mode),
    };
    for channel in &status.channels {
        out.push_str(&format!("LED {}: brightness {}", channel.channel, channel.brightness));
        if let Some(source) = channel.source {
            out.push_str(&format!(" ({})", source));
        }
        if let Some(timer) = &channel.timer {
            out.push_str(&format!(", timer {}", describe_timer(timer)));
        }
        out.push('\n');
    }
    if let Some(legs) = &status.combined {
        let legs: Vec<String> = legs
            .iter()
            .map(|leg| format!("LED {} {}", leg.channel, describe_timer(leg)))
            .collect();
        out.push_str(&format!("Combined timer: {}\n", legs.join(", ")));
    }
    out
}

fn describe_timer(timer: &TimerStatus) -> String {
    format!(
        "{} {} (brightness {})",
        timer.phase,
        format_remaining(timer.remaining_ms),
        timer.target_brightness
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ChannelStatus;
    use crate::events::BrightnessSource;
    use crate::timer::TimerPhase;
    use led_dimmer_hw::{Channel, ChannelMode, ConnectionState};

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("ports"), Ok(ConsoleCommand::Ports));
        assert_eq!(
            parse_command("connect /dev/ttyACM0"),
            Ok(ConsoleCommand::Connect("/dev/ttyACM0".to_string()))
        );
        assert_eq!(
            parse_command("  set 2   999 "),
            Ok(ConsoleCommand::Set {
                channel: 2,
                value: "999".to_string()
            })
        );
        assert_eq!(
            parse_command("timer 1 200 0.5"),
            Ok(ConsoleCommand::Timer {
                channel: 1,
                brightness: "200".to_string(),
                duration: "0.5".to_string()
            })
        );
        assert_eq!(parse_command("pause 1"), Ok(ConsoleCommand::Pause(1)));
        assert_eq!(parse_command("exit"), Ok(ConsoleCommand::Quit));
    }

    #[test]
    fn test_parse_combined() {
        assert_eq!(
            parse_command("combined start 100 - 2 3 sync-brightness"),
            Ok(ConsoleCommand::CombinedStart(CombinedTimerRequest {
                brightness1: "100".to_string(),
                brightness2: None,
                duration1: "2".to_string(),
                duration2: Some("3".to_string()),
                sync_brightness: true,
                sync_duration: false,
            }))
        );
        assert_eq!(
            parse_command("combined reset"),
            Ok(ConsoleCommand::CombinedReset)
        );
        assert!(parse_command("combined start 1 2 3 4 sync-everything").is_err());
    }

    #[test]
    fn test_parse_rejects() {
        assert!(parse_command("set one 5").is_err());
        assert!(parse_command("timer 1 200").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn test_render_status() {
        let status = Status {
            mode: ChannelMode::Dual,
            connection: ConnectionState {
                port: Some("/dev/ttyUSB0".to_string()),
                open: true,
            },
            channels: vec![
                ChannelStatus {
                    channel: Channel::ONE,
                    brightness: 200,
                    source: Some(BrightnessSource::Timer),
                    timer: Some(TimerStatus {
                        channel: Channel::ONE,
                        phase: TimerPhase::Paused,
                        remaining_ms: 61_000,
                        target_brightness: 200,
                    }),
                },
                ChannelStatus {
                    channel: Channel::TWO,
                    brightness: 0,
                    source: None,
                    timer: None,
                },
            ],
            combined: None,
        };
        assert_eq!(
            render_status(&status),
            "Connected to /dev/ttyUSB0 (dual mode)\n\
             LED 1: brightness 200 (timer), timer paused 01:01 (brightness 200)\n\
             LED 2: brightness 0\n"
        );
    }
}
