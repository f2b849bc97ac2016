// Motor control module for the two-wheel base
//
// Provides:
// - Duty-cycle pin boundary (in-process or bridged over zenoh)
// - Two-channel actuator with anti-stall burst

mod actuator;
pub mod pwm;

pub use actuator::{Channel, MotorActuator, TurnStyle, clamp_duty};
pub use pwm::{PinId, PwmPin, SimPin, ZenohPin, spawn_pwm_publisher};
