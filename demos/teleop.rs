// Keyboard teleop over a second serial/BT adapter: stands in for the phone app
// W/S/A/D move, space stops, E repeats, Q quits
//
// Usage: cargo run --example teleop -- --port /dev/rfcomm0
use std::io::Write;
use std::time::Duration;

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tracing::info;

use rover_link_runtime::config::DEFAULT_BAUD;
use rover_link_runtime::frame::{Command, encode};

#[derive(Parser, Debug)]
#[command(about = "Send direction frames from the keyboard")]
struct Args {
    /// Adapter paired with the rover's HC-05 (not the rover's own UART)
    #[arg(long)]
    port: String,
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    baud: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = Args::parse();
    info!("Opening {} at {} baud...", args.port, args.baud);
    let mut port = serialport::new(&args.port, args.baud)
        .timeout(Duration::from_millis(100))
        .open()?;

    info!("Controls: WASD=move, space=stop, E=repeat, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(port.as_mut());
    disable_raw_mode()?;

    // Leave the rover stopped on exit
    port.write_all(&encode(Command::Stop))?;
    result
}

fn key_command(code: KeyCode) -> Option<Command> {
    match code {
        KeyCode::Char('w') => Some(Command::Forward),
        KeyCode::Char('s') => Some(Command::Backward),
        KeyCode::Char('a') => Some(Command::Left),
        KeyCode::Char('d') => Some(Command::Right),
        KeyCode::Char(' ') => Some(Command::Stop),
        KeyCode::Char('e') => Some(Command::Repeat),
        _ => None,
    }
}

fn run_teleop(port: &mut dyn serialport::SerialPort) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        // Poll for key with 20ms timeout
        if !event::poll(Duration::from_millis(20))? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        if kind != KeyEventKind::Press && kind != KeyEventKind::Repeat {
            continue;
        }

        if matches!(code, KeyCode::Char('q') | KeyCode::Esc) {
            break;
        }
        if let Some(cmd) = key_command(code) {
            port.write_all(&encode(cmd))?;
            port.flush()?;
            info!("Sent {:?}\r", cmd);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_must_be_given() {
        assert!(Args::try_parse_from(["teleop"]).is_err());
        let args = Args::try_parse_from(["teleop", "--port", "/dev/rfcomm0"]).unwrap();
        assert_eq!(args.port, "/dev/rfcomm0");
        assert_eq!(args.baud, DEFAULT_BAUD);
    }

    #[test]
    fn test_key_bindings() {
        assert_eq!(key_command(KeyCode::Char('w')), Some(Command::Forward));
        assert_eq!(key_command(KeyCode::Char(' ')), Some(Command::Stop));
        assert_eq!(key_command(KeyCode::Char('e')), Some(Command::Repeat));
        assert_eq!(key_command(KeyCode::Char('x')), None);
    }
}
