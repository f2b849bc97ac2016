// Serial link, motor and telemetry configuration
use std::time::Duration;

use crate::motor::TurnStyle;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// No valid frame for this long marks the link stale (reporting only)
pub const LINK_TIMEOUT: Duration = Duration::from_millis(1000);

// Serial port of the HC-05 Bluetooth-UART bridge
pub const DEFAULT_PORT: &str = "/dev/ttyS0";
pub const DEFAULT_BAUD: u32 = 9600;

// Duty range is 16-bit: 0..=65535
pub const MAX_DUTY: u16 = u16::MAX;
pub const DEFAULT_CRUISE_DUTY: u16 = 60_000;

// Anti-stall burst before settling to cruise duty
pub const BURST_DURATION: Duration = Duration::from_millis(200);

// Carrier owned by the hardware bridge; kept low to reduce EMI on the UART line
pub const PWM_FREQ_HZ: u32 = 2000;

// Zenoh topics
pub const TOPIC_RT_PWM: &str = "rover/rt/pwm"; // duty writes
pub const TOPIC_RT_PWM_CARRIER: &str = "rover/rt/pwm_carrier"; // announced once
pub const TOPIC_STATE_MOTION: &str = "rover/state/motion"; // applied commands
pub const TOPIC_HEALTH: &str = "rover/state/health"; // link health

// Diagnostics
pub const BAUD_CANDIDATES: [u32; 4] = [9600, 38400, 57600, 115200];
pub const PROBE_WINDOW: Duration = Duration::from_secs(5);
pub const AT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Settings for one run of the control loop
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub port: String,
    pub baud: u32,
    pub cruise_duty: u16,
    pub burst: Duration,
    pub turn_style: TurnStyle,
    /// Drive in-process duty registers instead of publishing to the hardware bridge
    pub dry_run: bool,
    pub telemetry: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud: DEFAULT_BAUD,
            cruise_duty: DEFAULT_CRUISE_DUTY,
            burst: BURST_DURATION,
            turn_style: TurnStyle::default(),
            dry_run: false,
            telemetry: true,
        }
    }
}
