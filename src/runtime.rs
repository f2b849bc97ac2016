// 50 Hz poll loop: serial bytes -> frames -> movement state -> duty writes
//
// Single logical thread of control. While a move's anti-stall burst is
// running nothing reads the port; bytes queue in the UART buffer and are
// picked up on the next tick, in order.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, interval};
use tracing::{debug, info, warn};

// local imports
use crate::config::{
    LINK_TIMEOUT, LOOP_HZ, PWM_FREQ_HZ, RuntimeConfig, TOPIC_HEALTH, TOPIC_RT_PWM,
    TOPIC_RT_PWM_CARRIER, TOPIC_STATE_MOTION,
};
use crate::frame::{Command, FrameAssembler};
use crate::link::{self, SerialLink, Transport};
use crate::messages::{LinkHealth, MotionReport, PwmCarrier};
use crate::motion::{Drive, MotionStateMachine, Movement};
use crate::motor::{MotorActuator, PinId, PwmPin, SimPin, ZenohPin, spawn_pwm_publisher};

pub struct Controller<T, D> {
    transport: T,
    assembler: FrameAssembler,
    machine: MotionStateMachine<D>,
    last_frame_at: Option<Instant>,
    health: LinkHealth,
}

impl<T: Transport, D: Drive> Controller<T, D> {
    pub fn new(transport: T, drive: D) -> Self {
        Self {
            transport,
            assembler: FrameAssembler::new(),
            machine: MotionStateMachine::new(drive),
            last_frame_at: None,
            health: LinkHealth::Stale, // Start stale until first frame
        }
    }

    pub fn state(&self) -> Movement {
        self.machine.state()
    }

    pub fn health(&self) -> LinkHealth {
        self.health
    }

    pub fn machine(&self) -> &MotionStateMachine<D> {
        &self.machine
    }

    /// Drain the transport and apply every completed frame in stream order
    pub async fn poll_once(&mut self) -> link::Result<Vec<MotionReport>> {
        if self.transport.bytes_available()? == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.transport.read_available()?;
        debug!("Read {} bytes: {:02X?}", bytes.len(), bytes);

        let commands = self.assembler.push(&bytes);
        if !commands.is_empty() {
            self.last_frame_at = Some(Instant::now());
        }

        let mut reports = Vec::with_capacity(commands.len());
        for command in commands {
            debug!("Decoded {:?}", command);
            let changed = self.machine.apply(command).await;
            reports.push(MotionReport {
                command,
                state: self.machine.state(),
                changed,
            });
        }
        Ok(reports)
    }

    /// Recompute link health from the age of the last valid frame
    pub fn update_health(&mut self) -> LinkHealth {
        let fresh = self
            .last_frame_at
            .is_some_and(|at| at.elapsed() <= LINK_TIMEOUT);

        let health = if fresh { LinkHealth::Ok } else { LinkHealth::Stale };
        if health != self.health {
            match health {
                LinkHealth::Ok => info!("Link up, receiving frames"),
                LinkHealth::Stale => warn!(
                    "No valid frame for {}ms, link stale (holding {:?})",
                    LINK_TIMEOUT.as_millis(),
                    self.state()
                ),
            }
        }
        self.health = health;
        health
    }

    /// Bring the base to rest through the state machine
    pub async fn halt(&mut self) {
        self.machine.apply(Command::Stop).await;
    }
}

struct Telemetry {
    motion: zenoh::pubsub::Publisher<'static>,
    health: zenoh::pubsub::Publisher<'static>,
}

pub async fn run(config: RuntimeConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening serial link {} at {} baud...", config.port, config.baud);
    let mut link = SerialLink::open(&config.port, config.baud)?;
    link.clear_input()?;

    let session = if config.telemetry || !config.dry_run {
        info!("Opening Zenoh session...");
        Some(zenoh::open(zenoh::Config::default()).await?)
    } else {
        None
    };

    let (pins, pwm_task): ([Box<dyn PwmPin>; 4], _) = match &session {
        Some(session) if !config.dry_run => {
            let publisher = session.declare_publisher(TOPIC_RT_PWM).await?;
            let carrier = serde_json::to_string(&PwmCarrier {
                freq_hz: PWM_FREQ_HZ,
            })?;
            session.put(TOPIC_RT_PWM_CARRIER, carrier).await?;
            info!("Duty writes -> {} ({} Hz carrier)", TOPIC_RT_PWM, PWM_FREQ_HZ);

            let (tx, task) = spawn_pwm_publisher(publisher);
            let pins = PinId::ALL.map(|id| Box::new(ZenohPin::new(id, tx.clone())) as Box<dyn PwmPin>);
            (pins, Some(task))
        }
        _ => {
            info!("Dry run: duty writes stay in-process");
            let pins = PinId::ALL.map(|id| Box::new(SimPin::new(id)) as Box<dyn PwmPin>);
            (pins, None)
        }
    };

    let telemetry = match &session {
        Some(session) if config.telemetry => Some(Telemetry {
            motion: session.declare_publisher(TOPIC_STATE_MOTION).await?,
            health: session.declare_publisher(TOPIC_HEALTH).await?,
        }),
        _ => None,
    };

    let actuator = MotorActuator::from_pins(pins, config.cruise_duty)
        .with_burst(config.burst)
        .with_turn_style(config.turn_style);
    let mut controller = Controller::new(link, actuator);
    info!(
        "Runtime started: {}Hz loop, cruise duty {}, {}ms burst, {:?} turns",
        LOOP_HZ,
        controller.machine().drive().cruise_duty(),
        config.burst.as_millis(),
        config.turn_style
    );
    if telemetry.is_some() {
        info!("Publishing to: {}, {}", TOPIC_STATE_MOTION, TOPIC_HEALTH);
    }

    let result = control_loop(&mut controller, telemetry.as_ref(), tokio::signal::ctrl_c()).await;

    // Dropping the controller releases the last pin senders so the publisher drains
    drop(controller);
    if let Some(task) = pwm_task {
        task.await?;
    }

    result
}

/// Tick until `shutdown` resolves or a step fails, then halt the base
///
/// `shutdown` is created once and stays registered across ticks, so a
/// signal that lands while a step is awaiting a burst is still seen on the
/// next select.
async fn control_loop<T: Transport, D: Drive, S: Future>(
    controller: &mut Controller<T, D>,
    telemetry: Option<&Telemetry>,
    shutdown: S,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            // Shutdown first, so it is registered before the first step runs
            biased;
            _ = &mut shutdown => {
                info!("Interrupted, stopping");
                break Ok(());
            }
            _ = tick.tick() => {}
        }

        if let Err(e) = step(controller, telemetry).await {
            break Err(e);
        }
    };

    controller.halt().await;
    result
}

async fn step<T: Transport, D: Drive>(
    controller: &mut Controller<T, D>,
    telemetry: Option<&Telemetry>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // 1. Drain the port and apply decoded commands
    let reports = controller.poll_once().await?;

    // 2. Link health (reporting only)
    let health = controller.update_health();

    let Some(telemetry) = telemetry else {
        return Ok(());
    };

    // 3. Publish applied commands
    for report in &reports {
        let json = serde_json::to_string(report)?;
        telemetry.motion.put(json).await?;
    }

    // 4. Publish health
    let health_json = serde_json::to_string(&health)?;
    telemetry.health.put(health_json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Notify;

    use super::*;
    use crate::frame::encode;
    use crate::link::tests::ScriptedTransport;
    use crate::motion::tests::ScriptedDrive;

    fn controller(chunks: Vec<Vec<u8>>) -> Controller<ScriptedTransport, ScriptedDrive> {
        Controller::new(ScriptedTransport::new(chunks), ScriptedDrive::default())
    }

    #[tokio::test]
    async fn test_empty_transport_is_quiet() {
        let mut c = controller(vec![]);
        assert!(c.poll_once().await.unwrap().is_empty());
        assert_eq!(c.state(), Movement::Stop);
    }

    #[tokio::test]
    async fn test_noisy_stream_end_to_end() {
        let buf = [
            &[0xAAu8][..],
            &encode(Command::Forward),
            &encode(Command::Forward),
            &encode(Command::Stop),
        ]
        .concat();
        let mut c = controller(vec![buf]);

        let reports = c.poll_once().await.unwrap();
        let changed: Vec<bool> = reports.iter().map(|r| r.changed).collect();
        assert_eq!(changed, vec![true, false, true]);
        assert_eq!(reports[1].state, Movement::Forward);
        assert_eq!(
            c.machine().drive().calls,
            vec![Movement::Forward, Movement::Stop]
        );
    }

    #[tokio::test]
    async fn test_frame_split_across_polls() {
        let frame = encode(Command::Left);
        let mut c = controller(vec![frame[..5].to_vec(), frame[5..].to_vec()]);

        assert!(c.poll_once().await.unwrap().is_empty());
        let reports = c.poll_once().await.unwrap();
        assert_eq!(
            reports,
            vec![MotionReport {
                command: Command::Left,
                state: Movement::Left,
                changed: true,
            }]
        );
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let mut transport = ScriptedTransport::new(vec![encode(Command::Forward).to_vec()]);
        transport.fail_next = true;
        let mut c = Controller::new(transport, ScriptedDrive::default());

        assert!(c.poll_once().await.is_err());
        assert_eq!(c.state(), Movement::Stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_health_follows_frames() {
        let mut c = controller(vec![encode(Command::Repeat).to_vec()]);
        assert_eq!(c.health(), LinkHealth::Stale);
        assert_eq!(c.update_health(), LinkHealth::Stale);

        c.poll_once().await.unwrap();
        assert_eq!(c.update_health(), LinkHealth::Ok);
        assert_eq!(c.health(), LinkHealth::Ok);

        tokio::time::advance(LINK_TIMEOUT + Duration::from_millis(1)).await;
        assert_eq!(c.update_health(), LinkHealth::Stale);
        assert_eq!(c.health(), LinkHealth::Stale);
        // Going stale does not touch the held movement
        assert_eq!(c.machine().drive().calls, vec![Movement::Stop]);
    }

    #[tokio::test]
    async fn test_halt_stops_moving_base() {
        let mut c = controller(vec![encode(Command::Backward).to_vec()]);
        c.poll_once().await.unwrap();
        c.halt().await;
        assert_eq!(c.state(), Movement::Stop);
        assert_eq!(
            c.machine().drive().calls,
            vec![Movement::Backward, Movement::Stop]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_burst_stops_loop_and_halts() {
        let probes = PinId::ALL.map(SimPin::new);
        let actuator = MotorActuator::from_pins(probes.clone(), 60000)
            .with_burst(Duration::from_millis(200));
        let transport = ScriptedTransport::new(vec![encode(Command::Forward).to_vec()]);
        let mut c = Controller::new(transport, actuator);

        // notify_waiters only reaches futures already registered, like a
        // signal only reaches a listener that exists when it is raised
        let notify = Arc::new(Notify::new());
        let shutdown = notify.notified();
        let raise = {
            let notify = notify.clone();
            tokio::spawn(async move {
                // First tick is immediate, so this lands inside the forward burst
                tokio::time::sleep(Duration::from_millis(100)).await;
                notify.notify_waiters();
            })
        };

        let start = Instant::now();
        let result =
            tokio::time::timeout(Duration::from_secs(5), control_loop(&mut c, None, shutdown))
                .await;
        raise.await.unwrap();

        assert!(result.is_ok(), "shutdown raised during a step was missed");
        assert!(result.unwrap().is_ok());
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(c.state(), Movement::Stop);
        assert!(probes.iter().all(|p| p.duty() == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_halts_after_transport_error() {
        let mut c = controller(vec![encode(Command::Backward).to_vec()]);
        c.poll_once().await.unwrap();

        c.transport.chunks.push_back(encode(Command::Left).to_vec());
        c.transport.fail_next = true;
        let result = control_loop(&mut c, None, std::future::pending::<()>()).await;

        assert!(result.is_err());
        assert_eq!(c.state(), Movement::Stop);
        assert_eq!(
            c.machine().drive().calls,
            vec![Movement::Backward, Movement::Stop]
        );
    }
}
