// HC-05 direction frame codec
//
// Frame format (8 bytes): [0xFF, 0x01, 0x01, 0x01, 0x02, 0x00, DIR, 0x00]
// The link shares a board with the PWM motor drivers, so bytes get corrupted
// in transit. A candidate is only accepted when header, tail and direction
// code all check out; anything else is skipped one byte at a time.

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Total frame length in bytes
pub const FRAME_LEN: usize = 8;

/// Fixed header, first byte doubles as the sync marker
pub const HEADER: [u8; 6] = [0xFF, 0x01, 0x01, 0x01, 0x02, 0x00];
const SYNC: u8 = HEADER[0];

const DIR_INDEX: usize = 6;
const TAIL_INDEX: usize = 7;
pub const TAIL: u8 = 0x00;

/// Command symbol carried in the direction byte
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Re-assert whatever movement is currently held
    Repeat = 0x00,
    Forward = 0x01,
    Backward = 0x02,
    Left = 0x04,
    Right = 0x08,
    Stop = 0x10,
}

impl Command {
    /// Map a direction code to its command; `None` for codes outside the set
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::Repeat),
            0x01 => Some(Self::Forward),
            0x02 => Some(Self::Backward),
            0x04 => Some(Self::Left),
            0x08 => Some(Self::Right),
            0x10 => Some(Self::Stop),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Validate a candidate and return its command
///
/// Valid iff exactly `FRAME_LEN` bytes, header matches, tail matches and the
/// direction code is known.
pub fn parse_frame(candidate: &[u8]) -> Option<Command> {
    if candidate.len() != FRAME_LEN {
        return None;
    }
    if candidate[..DIR_INDEX] != HEADER || candidate[TAIL_INDEX] != TAIL {
        return None;
    }
    Command::from_code(candidate[DIR_INDEX])
}

pub fn is_valid_frame(candidate: &[u8]) -> bool {
    parse_frame(candidate).is_some()
}

/// Build the wire frame for a command
pub fn encode(cmd: Command) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[..DIR_INDEX].copy_from_slice(&HEADER);
    frame[DIR_INDEX] = cmd.code();
    frame[TAIL_INDEX] = TAIL;
    frame
}

/// Result of scanning one buffer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scan {
    /// Decoded commands, in stream order
    pub commands: Vec<Command>,
    /// Bytes fully resolved; anything after this is an incomplete frame
    pub consumed: usize,
}

/// Scan a buffer left to right for valid frames
pub fn scan(buf: &[u8]) -> Scan {
    let mut commands = Vec::new();
    let n = buf.len();
    let mut i = 0;

    while i < n {
        if buf[i] != SYNC {
            i += 1;
            continue;
        }

        if n - i < FRAME_LEN {
            // Incomplete frame, needs more bytes
            break;
        }

        let candidate = &buf[i..i + FRAME_LEN];
        match parse_frame(candidate) {
            Some(cmd) => {
                commands.push(cmd);
                i += FRAME_LEN;
            }
            None => {
                // Resync: a real frame may start right after this byte
                trace!("Rejected frame candidate at {}: {:02X?}", i, candidate);
                i += 1;
            }
        }
    }

    Scan {
        commands,
        consumed: i,
    }
}

/// Decode every valid frame in a single buffer snapshot
///
/// Each call is independent: a trailing incomplete frame is dropped.
pub fn decode(buf: &[u8]) -> Vec<Command> {
    scan(buf).commands
}

/// Stream decoder that keeps an incomplete trailing frame between reads
///
/// Feeding the stream in arbitrary chunks yields the same commands as
/// decoding the whole stream at once.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    pending: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly read bytes and return the commands they complete
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Command> {
        self.pending.extend_from_slice(bytes);
        let scan = scan(&self.pending);
        self.pending.drain(..scan.consumed);
        scan.commands
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
