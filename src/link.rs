// Serial link to the HC-05 Bluetooth-UART bridge
//
// The control loop only needs two things from the port: how many bytes are
// waiting and a destructive read of them. The diagnostic helpers (AT
// commands, baud probing) open the port on their own and must not run while
// the control loop owns it.

use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, info, warn};

/// Read timeout for the control loop; reads only ever ask for buffered bytes
const READ_TIMEOUT_MS: u64 = 10;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const SETTLE_AFTER_CHUNK: Duration = Duration::from_millis(50);

/// Error types for the serial link
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No response to {command:?}")]
    NoResponse { command: String },
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Byte source polled by the control loop
pub trait Transport {
    /// Bytes waiting in the receive buffer
    fn bytes_available(&mut self) -> Result<usize>;

    /// Drain everything currently buffered
    fn read_available(&mut self) -> Result<Vec<u8>>;
}

/// HC-05 link over a serial device
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Open the link (8N1, no flow control)
    pub fn open(port_name: &str, baud: u32) -> Result<Self> {
        Ok(Self {
            port: open_port(port_name, baud, Duration::from_millis(READ_TIMEOUT_MS))?,
        })
    }

    /// Discard bytes received before the loop started
    pub fn clear_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

impl Transport for SerialLink {
    fn bytes_available(&mut self) -> Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read_available(&mut self) -> Result<Vec<u8>> {
        let n = self.bytes_available()?;
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; n];
        let read = self.port.read(&mut buf)?;
        buf.truncate(read);
        Ok(buf)
    }
}

fn open_port(port_name: &str, baud: u32, timeout: Duration) -> Result<Box<dyn SerialPort>> {
    let port = serialport::new(port_name, baud)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(timeout)
        .open()?;
    Ok(port)
}

// === Diagnostics ===

/// Reply to an AT command
#[derive(Debug, Clone, PartialEq)]
pub struct AtResponse {
    pub raw: Vec<u8>,
    /// ASCII subset of `raw`
    pub text: String,
}

/// Terminate an AT command with CRLF unless it already ends in CR or LF
pub fn at_command_line(command: &str) -> String {
    if command.ends_with('\r') || command.ends_with('\n') {
        command.to_string()
    } else {
        format!("{}\r\n", command)
    }
}

/// Keep only ASCII bytes
pub fn ascii_text(raw: &[u8]) -> String {
    raw.iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect()
}

/// Send one AT command and collect whatever arrives before the timeout
pub fn send_at(port_name: &str, baud: u32, command: &str, timeout: Duration) -> Result<AtResponse> {
    let mut port = open_port(port_name, baud, Duration::from_millis(READ_TIMEOUT_MS))?;
    let line = at_command_line(command);

    info!("Sending AT command: {:?}", command);
    port.write_all(line.as_bytes())?;
    port.flush()?;

    let raw = collect_until(port.as_mut(), Instant::now() + timeout, false)?;
    if raw.is_empty() {
        warn!("No response received (timeout)");
        return Err(LinkError::NoResponse {
            command: command.to_string(),
        });
    }

    debug!("Raw response: {:02X?}", raw);
    let text = ascii_text(&raw);
    info!("Response: {:?}", text);
    Ok(AtResponse { raw, text })
}

/// What one candidate baud rate produced
#[derive(Debug, Clone, PartialEq)]
pub struct BaudProbe {
    pub baud: u32,
    /// First chunk received at this rate; empty if nothing arrived
    pub received: Vec<u8>,
}

impl BaudProbe {
    pub fn responded(&self) -> bool {
        !self.received.is_empty()
    }
}

/// Listen at each candidate rate for up to `window`
///
/// The remote side has to be sending (e.g. typing in the phone app) while
/// this runs. Garbage at a wrong rate still counts as a response, so check
/// the decoded text before trusting a result.
pub fn probe_baud(port_name: &str, rates: &[u32], window: Duration) -> Result<Vec<BaudProbe>> {
    let mut results = Vec::with_capacity(rates.len());

    for &baud in rates {
        info!("Testing baud rate {} for {:?}", baud, window);
        let mut port = open_port(port_name, baud, Duration::from_millis(READ_TIMEOUT_MS))?;
        port.clear(ClearBuffer::Input)?;

        let received = collect_until(port.as_mut(), Instant::now() + window, true)?;
        if received.is_empty() {
            debug!("Nothing at {} baud", baud);
        } else {
            info!(
                "Received at {} baud: {:02X?} ({:?})",
                baud,
                received,
                ascii_text(&received)
            );
        }
        results.push(BaudProbe { baud, received });
    }

    Ok(results)
}

/// Poll the port until `deadline`; with `first_chunk` stop at the first data
fn collect_until(port: &mut dyn SerialPort, deadline: Instant, first_chunk: bool) -> Result<Vec<u8>> {
    let mut collected = Vec::new();

    while Instant::now() < deadline {
        let n = port.bytes_to_read()? as usize;
        if n == 0 {
            thread::sleep(POLL_INTERVAL);
            continue;
        }

        let mut chunk = vec![0u8; n];
        let read = port.read(&mut chunk)?;
        collected.extend_from_slice(&chunk[..read]);
        if first_chunk {
            break;
        }
        // Give the module time to finish its reply
        thread::sleep(SETTLE_AFTER_CHUNK);
    }

    Ok(collected)
}
