// Two-channel DC motor actuator
//
// Each channel is an H-bridge input pair driven by PWM on the active
// direction pin while the opposite pin is held at zero. Whole-robot moves
// start with a full-duty burst to break static friction, then settle to the
// cruise duty and stay driven after the call returns.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::pwm::{PinId, PwmPin};
use crate::config::{BURST_DURATION, MAX_DUTY};
use crate::motion::{Drive, Movement};

/// Clamp a requested duty into `0..=MAX_DUTY`
pub fn clamp_duty(duty: i32) -> u16 {
    duty.clamp(0, MAX_DUTY as i32) as u16
}

/// What the non-leading channel does during a turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TurnStyle {
    /// Opposite channel stopped: rotate about the stopped wheel
    #[default]
    Pivot,
    /// Opposite channel reversed: rotate about the robot centre
    Spin,
}

/// One motor channel: forward and backward polarity pins
pub struct Channel<P> {
    forward: P,
    backward: P,
}

impl<P: PwmPin> Channel<P> {
    pub fn new(forward: P, backward: P) -> Self {
        Self { forward, backward }
    }

    // Opposite pin is always cleared before the active one is set
    fn drive_forward(&mut self, duty: u16) {
        self.backward.set_duty(0);
        self.forward.set_duty(duty);
    }

    fn drive_backward(&mut self, duty: u16) {
        self.forward.set_duty(0);
        self.backward.set_duty(duty);
    }

    fn stop(&mut self) {
        self.forward.set_duty(0);
        self.backward.set_duty(0);
    }
}

/// Motor actuator for the two-wheel base
///
/// The only component that writes duty values. Channel A is the left-hand
/// pair (IN1/IN2), channel B the right-hand pair (IN3/IN4).
pub struct MotorActuator<P: PwmPin> {
    a: Channel<P>,
    b: Channel<P>,
    cruise_duty: u16,
    burst: Duration,
    turn_style: TurnStyle,
}

impl<P: PwmPin> MotorActuator<P> {
    /// Create an actuator with all four pins driven to zero
    pub fn new(a: Channel<P>, b: Channel<P>, cruise_duty: u16) -> Self {
        let mut actuator = Self {
            a,
            b,
            cruise_duty: cruise_duty.min(MAX_DUTY),
            burst: BURST_DURATION,
            turn_style: TurnStyle::default(),
        };
        actuator.a.stop();
        actuator.b.stop();
        actuator
    }

    /// Build from pins listed in `PinId::ALL` order
    pub fn from_pins([a_fwd, a_back, b_fwd, b_back]: [P; 4], cruise_duty: u16) -> Self {
        Self::new(
            Channel::new(a_fwd, a_back),
            Channel::new(b_fwd, b_back),
            cruise_duty,
        )
    }

    pub fn with_burst(mut self, burst: Duration) -> Self {
        self.burst = burst;
        self
    }

    pub fn with_turn_style(mut self, turn_style: TurnStyle) -> Self {
        self.turn_style = turn_style;
        self
    }

    pub fn cruise_duty(&self) -> u16 {
        self.cruise_duty
    }

    // === Per-channel primitives ===

    pub fn channel_a_forward(&mut self, duty: i32) {
        self.a.drive_forward(clamp_duty(duty));
    }

    pub fn channel_a_backward(&mut self, duty: i32) {
        self.a.drive_backward(clamp_duty(duty));
    }

    pub fn channel_a_stop(&mut self) {
        self.a.stop();
    }

    pub fn channel_b_forward(&mut self, duty: i32) {
        self.b.drive_forward(clamp_duty(duty));
    }

    pub fn channel_b_backward(&mut self, duty: i32) {
        self.b.drive_backward(clamp_duty(duty));
    }

    pub fn channel_b_stop(&mut self) {
        self.b.stop();
    }

    // === Composed primitives ===

    pub async fn forward_at(&mut self, cruise: i32) {
        self.burst_then_cruise(Movement::Forward, cruise).await
    }

    pub async fn backward_at(&mut self, cruise: i32) {
        self.burst_then_cruise(Movement::Backward, cruise).await
    }

    pub async fn spin_left_at(&mut self, cruise: i32) {
        self.burst_then_cruise(Movement::Left, cruise).await
    }

    pub async fn spin_right_at(&mut self, cruise: i32) {
        self.burst_then_cruise(Movement::Right, cruise).await
    }

    /// Zero all four pins, no burst
    pub fn stop_all(&mut self) {
        debug!("Stopping both channels");
        self.a.stop();
        self.b.stop();
    }

    /// Runs to completion once started; nothing can cut the burst short
    async fn burst_then_cruise(&mut self, movement: Movement, cruise: i32) {
        debug!(
            "{:?}: burst {}ms then cruise {}",
            movement,
            self.burst.as_millis(),
            clamp_duty(cruise)
        );
        self.set_channels(movement, MAX_DUTY as i32);
        tokio::time::sleep(self.burst).await;
        self.set_channels(movement, cruise);
    }

    fn set_channels(&mut self, movement: Movement, duty: i32) {
        match (movement, self.turn_style) {
            (Movement::Forward, _) => {
                self.channel_a_forward(duty);
                self.channel_b_forward(duty);
            }
            (Movement::Backward, _) => {
                self.channel_a_backward(duty);
                self.channel_b_backward(duty);
            }
            (Movement::Left, TurnStyle::Pivot) => {
                self.channel_a_forward(duty);
                self.channel_b_stop();
            }
            (Movement::Left, TurnStyle::Spin) => {
                self.channel_a_forward(duty);
                self.channel_b_backward(duty);
            }
            (Movement::Right, TurnStyle::Pivot) => {
                self.channel_a_stop();
                self.channel_b_forward(duty);
            }
            (Movement::Right, TurnStyle::Spin) => {
                self.channel_a_backward(duty);
                self.channel_b_forward(duty);
            }
            (Movement::Stop, _) => self.stop_all(),
        }
    }
}

impl<P: PwmPin> Drive for MotorActuator<P> {
    async fn forward(&mut self) {
        self.forward_at(self.cruise_duty as i32).await
    }

    async fn backward(&mut self) {
        self.backward_at(self.cruise_duty as i32).await
    }

    async fn spin_left(&mut self) {
        self.spin_left_at(self.cruise_duty as i32).await
    }

    async fn spin_right(&mut self) {
        self.spin_right_at(self.cruise_duty as i32).await
    }

    async fn stop(&mut self) {
        self.stop_all()
    }
}

impl<P: PwmPin> Drop for MotorActuator<P> {
    fn drop(&mut self) {
        // Never leave the base driven once the owner is gone
        info!("Actuator dropped, zeroing all {} pins", PinId::ALL.len());
        self.stop_all();
    }
}
