// Message types published by the runtime

use serde::{Deserialize, Serialize};

use crate::frame::Command;
use crate::motion::Movement;
use crate::motor::PinId;

// One duty write, runtime -> hardware bridge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PwmCommand {
    pub pin: PinId,
    pub duty: u16,
}

// Carrier frequency the bridge should configure once at startup
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PwmCarrier {
    pub freq_hz: u32,
}

/// Outcome of applying one decoded command to the state machine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MotionReport {
    pub command: Command,
    pub state: Movement,
    pub changed: bool,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LinkHealth {
    Ok,
    Stale,
}
