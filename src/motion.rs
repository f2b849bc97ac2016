// Movement state machine
//
// Holds the current movement and only re-actuates on change, so a stream
// of identical frames from the app does not restart the anti-stall burst
// on every frame. `Repeat` re-asserts whatever is held.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::frame::Command;

/// Movement held by the state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    Forward,
    Backward,
    Left,
    Right,
    #[default]
    Stop,
}

impl Command {
    /// Movement this command selects; `None` for `Repeat`
    pub fn movement(self) -> Option<Movement> {
        match self {
            Command::Repeat => None,
            Command::Forward => Some(Movement::Forward),
            Command::Backward => Some(Movement::Backward),
            Command::Left => Some(Movement::Left),
            Command::Right => Some(Movement::Right),
            Command::Stop => Some(Movement::Stop),
        }
    }
}

/// Whole-robot motion primitives the state machine drives
pub trait Drive {
    fn forward(&mut self) -> impl Future<Output = ()>;
    fn backward(&mut self) -> impl Future<Output = ()>;
    fn spin_left(&mut self) -> impl Future<Output = ()>;
    fn spin_right(&mut self) -> impl Future<Output = ()>;
    fn stop(&mut self) -> impl Future<Output = ()>;
}

pub struct MotionStateMachine<D> {
    drive: D,
    state: Movement,
}

impl<D: Drive> MotionStateMachine<D> {
    /// Starts in `Stop`; the drive is assumed to be stopped already
    pub fn new(drive: D) -> Self {
        Self {
            drive,
            state: Movement::Stop,
        }
    }

    pub fn state(&self) -> Movement {
        self.state
    }

    pub fn drive(&self) -> &D {
        &self.drive
    }

    /// Apply one decoded command
    ///
    /// Returns `true` only when the held movement changed. Every change is
    /// actuated before this returns.
    pub async fn apply(&mut self, cmd: Command) -> bool {
        let Some(target) = cmd.movement() else {
            debug!("Repeat: re-asserting {:?}", self.state);
            self.actuate(self.state).await;
            return false;
        };

        if target == self.state {
            return false;
        }

        info!("Movement {:?} -> {:?}", self.state, target);
        self.actuate(target).await;
        self.state = target;
        true
    }

    async fn actuate(&mut self, movement: Movement) {
        match movement {
            Movement::Forward => self.drive.forward().await,
            Movement::Backward => self.drive.backward().await,
            Movement::Left => self.drive.spin_left().await,
            Movement::Right => self.drive.spin_right().await,
            Movement::Stop => self.drive.stop().await,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use super::*;
    use crate::frame::{decode, encode};
    use crate::motor::{MotorActuator, PinId, SimPin};

    /// Records which primitive was invoked
    #[derive(Default)]
    pub(crate) struct ScriptedDrive {
        pub calls: Vec<Movement>,
    }

    impl Drive for ScriptedDrive {
        async fn forward(&mut self) {
            self.calls.push(Movement::Forward);
        }
        async fn backward(&mut self) {
            self.calls.push(Movement::Backward);
        }
        async fn spin_left(&mut self) {
            self.calls.push(Movement::Left);
        }
        async fn spin_right(&mut self) {
            self.calls.push(Movement::Right);
        }
        async fn stop(&mut self) {
            self.calls.push(Movement::Stop);
        }
    }

    #[test]
    fn test_command_to_movement() {
        assert_eq!(Command::Repeat.movement(), None);
        assert_eq!(Command::Left.movement(), Some(Movement::Left));
        assert_eq!(Command::Stop.movement(), Some(Movement::Stop));
    }

    #[tokio::test]
    async fn test_initial_state_is_stop() {
        let sm = MotionStateMachine::new(ScriptedDrive::default());
        assert_eq!(sm.state(), Movement::Stop);
        assert!(sm.drive().calls.is_empty());
    }

    #[tokio::test]
    async fn test_change_actuates_once() {
        let mut sm = MotionStateMachine::new(ScriptedDrive::default());

        assert!(sm.apply(Command::Forward).await);
        assert_eq!(sm.state(), Movement::Forward);
        assert_eq!(sm.drive().calls, vec![Movement::Forward]);

        assert!(!sm.apply(Command::Forward).await);
        assert_eq!(sm.drive().calls, vec![Movement::Forward]);
    }

    #[tokio::test]
    async fn test_stop_from_initial_is_noop() {
        let mut sm = MotionStateMachine::new(ScriptedDrive::default());
        assert!(!sm.apply(Command::Stop).await);
        assert!(sm.drive().calls.is_empty());
    }

    #[tokio::test]
    async fn test_repeat_reasserts_held_state() {
        let mut sm = MotionStateMachine::new(ScriptedDrive::default());

        assert!(!sm.apply(Command::Repeat).await);
        assert_eq!(sm.drive().calls, vec![Movement::Stop]);

        sm.apply(Command::Left).await;
        assert!(!sm.apply(Command::Repeat).await);
        assert_eq!(sm.state(), Movement::Left);
        assert_eq!(
            sm.drive().calls,
            vec![Movement::Stop, Movement::Left, Movement::Left]
        );
    }

    #[tokio::test]
    async fn test_every_transition_dispatches_matching_primitive() {
        let mut sm = MotionStateMachine::new(ScriptedDrive::default());
        let seq = [
            Command::Backward,
            Command::Right,
            Command::Left,
            Command::Forward,
            Command::Stop,
        ];
        for cmd in seq {
            assert!(sm.apply(cmd).await);
        }
        let expected: Vec<Movement> = seq.iter().filter_map(|c| c.movement()).collect();
        assert_eq!(sm.drive().calls, expected);
    }

    #[tokio::test]
    async fn test_decode_to_actuation_end_to_end() {
        let buf = [
            &[0xAAu8][..],
            &encode(Command::Forward),
            &encode(Command::Forward),
            &encode(Command::Stop),
        ]
        .concat();

        let mut sm = MotionStateMachine::new(ScriptedDrive::default());
        let mut changes = Vec::new();
        for cmd in decode(&buf) {
            changes.push(sm.apply(cmd).await);
        }

        assert_eq!(changes, vec![true, false, true]);
        assert_eq!(sm.drive().calls, vec![Movement::Forward, Movement::Stop]);
        assert_eq!(sm.state(), Movement::Stop);
    }

    #[tokio::test]
    async fn test_drives_real_actuator() {
        let probes = PinId::ALL.map(SimPin::new);
        let actuator =
            MotorActuator::from_pins(probes.clone(), 40000).with_burst(Duration::ZERO);
        let mut sm = MotionStateMachine::new(actuator);

        sm.apply(Command::Backward).await;
        assert_eq!(probes.each_ref().map(|p| p.duty()), [0, 40000, 0, 40000]);

        sm.apply(Command::Stop).await;
        assert_eq!(probes.each_ref().map(|p| p.duty()), [0; 4]);
    }
}
