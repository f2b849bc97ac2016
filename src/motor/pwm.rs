// Duty-cycle outputs for the two motor channels
//
// The runtime never touches the PWM peripheral directly. Each of the four
// driver inputs is a `PwmPin`: either an in-process register (dry runs and
// tests) or a handle that forwards writes to the hardware bridge over zenoh.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::messages::PwmCommand;

/// The four driver inputs (two polarity pins per channel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinId {
    AForward,
    ABackward,
    BForward,
    BBackward,
}

impl PinId {
    pub const ALL: [PinId; 4] = [
        PinId::AForward,
        PinId::ABackward,
        PinId::BForward,
        PinId::BBackward,
    ];
}

/// A single duty-cycle output
pub trait PwmPin {
    /// Apply a duty value, already clamped to `0..=MAX_DUTY`
    fn set_duty(&mut self, duty: u16);
}

impl<P: PwmPin + ?Sized> PwmPin for Box<P> {
    fn set_duty(&mut self, duty: u16) {
        (**self).set_duty(duty)
    }
}

/// In-process duty register
///
/// Clones share the same register, so a caller can keep a handle and read
/// back what the actuator wrote.
#[derive(Debug, Clone)]
pub struct SimPin {
    id: PinId,
    duty: Arc<AtomicU16>,
}

impl SimPin {
    pub fn new(id: PinId) -> Self {
        Self {
            id,
            duty: Arc::new(AtomicU16::new(0)),
        }
    }

    pub fn id(&self) -> PinId {
        self.id
    }

    pub fn duty(&self) -> u16 {
        self.duty.load(Ordering::Relaxed)
    }
}

impl PwmPin for SimPin {
    fn set_duty(&mut self, duty: u16) {
        debug!("[sim] {:?} duty={}", self.id, duty);
        self.duty.store(duty, Ordering::Relaxed);
    }
}

/// Forwards duty writes to the hardware bridge
///
/// Writes are queued in order on a channel drained by the task started with
/// `spawn_pwm_publisher`, so setting a duty never waits on the network.
#[derive(Debug, Clone)]
pub struct ZenohPin {
    id: PinId,
    tx: mpsc::UnboundedSender<PwmCommand>,
}

impl ZenohPin {
    pub fn new(id: PinId, tx: mpsc::UnboundedSender<PwmCommand>) -> Self {
        Self { id, tx }
    }
}

impl PwmPin for ZenohPin {
    fn set_duty(&mut self, duty: u16) {
        let cmd = PwmCommand { pin: self.id, duty };
        if self.tx.send(cmd).is_err() {
            warn!("PWM publisher gone, dropped {:?}", cmd);
        }
    }
}

/// Start the task that publishes queued duty writes
///
/// The task ends once every sender (every `ZenohPin`) is dropped and the
/// queue is drained.
pub fn spawn_pwm_publisher(
    publisher: zenoh::pubsub::Publisher<'static>,
) -> (mpsc::UnboundedSender<PwmCommand>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<PwmCommand>();

    let task = tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            let json = match serde_json::to_string(&cmd) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to encode {:?}: {}", cmd, e);
                    continue;
                }
            };
            if let Err(e) = publisher.put(json).await {
                warn!("Failed to publish duty write: {}", e);
            }
        }
        debug!("PWM publisher stopped");
    });

    (tx, task)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_pin_clones_share_register() {
        let probe = SimPin::new(PinId::BBackward);
        let mut pin = probe.clone();
        pin.set_duty(1234);
        assert_eq!(probe.duty(), 1234);
        assert_eq!(probe.id(), PinId::BBackward);
    }

    #[tokio::test]
    async fn test_zenoh_pin_queues_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pin = ZenohPin::new(PinId::AForward, tx);
        pin.set_duty(65535);
        pin.set_duty(60000);
        assert_eq!(rx.recv().await.unwrap().duty, 65535);
        assert_eq!(
            rx.recv().await.unwrap(),
            PwmCommand {
                pin: PinId::AForward,
                duty: 60000
            }
        );
    }
}
