//! dispatcher.rs
//! Feeds commands from the intake channel into the vehicle, one at a time.
//! Owns the vehicle while running and hands it back so the caller can stop it.

use crossbeam::channel::RecvTimeoutError;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use log::{error, info};

use crate::actuator::vehicle::Vehicle;
use crate::command::subscriber::CommandQueue;
use crate::error::DriveResult;

const DEFAULT_POLL: Duration = Duration::from_millis(100);

pub struct CommandDispatcher {
    rx: CommandQueue,
    vehicle: Vehicle,
    running: Arc<AtomicBool>,
    poll: Duration,
}

impl CommandDispatcher {
    pub fn new(rx: CommandQueue, vehicle: Vehicle, running: Arc<AtomicBool>) -> Self {
        Self {
            rx,
            vehicle,
            running,
            poll: DEFAULT_POLL,
        }
    }

    /// How often `running` is re-checked while no command arrives.
    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Dispatch until shutdown, end of input, or a fatal write fault.
    /// Both of the latter clear `running` so the whole node stops.
    pub fn run(&mut self) -> DriveResult<()> {
        while self.running.load(Ordering::Acquire) {
            match self.rx.recv_timeout(self.poll) {
                Ok(cmd) => {
                    if let Err(e) = self.vehicle.handle(&cmd) {
                        error!("[Dispatcher] command {:?} failed: {}", cmd, e);
                        self.running.store(false, Ordering::Release);
                        return Err(e);
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    info!("[Dispatcher] command stream closed");
                    self.running.store(false, Ordering::Release);
                    break;
                }
            }
        }
        info!(
            "[Dispatcher] exiting after {} commands",
            self.vehicle.commands_handled()
        );
        Ok(())
    }

    /// Dropping the queue here is what lets a blocked subscriber give up.
    pub fn into_vehicle(self) -> Vehicle {
        self.vehicle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::board::SimulatedBoard;
    use crate::actuator::bus::SharedBus;
    use crate::command::message::DriveCommand;
    use crate::command::subscriber::{CommandSubscriber, DeliveryPolicy};
    use crate::config::NodeConfig;

    fn vehicle(board: &SimulatedBoard) -> Vehicle {
        let config = NodeConfig {
            init_delay: Duration::ZERO,
            calibration_delay: Duration::ZERO,
            ..NodeConfig::default()
        };
        Vehicle::new(SharedBus::new(board.clone()), &config).unwrap()
    }

    #[test]
    fn test_runs_until_stream_closes() {
        let board = SimulatedBoard::new();
        let (mut sub, queue) = CommandSubscriber::channel(DeliveryPolicy::Blocking);
        let running = Arc::new(AtomicBool::new(true));
        let mut dispatcher = CommandDispatcher::new(queue, vehicle(&board), running.clone())
            .with_poll(Duration::from_millis(5));

        let intake = std::thread::spawn(move || {
            sub.run("120,0\n-60,15\n".as_bytes(), &AtomicBool::new(true))
                .unwrap()
        });

        dispatcher.run().unwrap();
        assert_eq!(intake.join().unwrap(), 2);
        assert!(!running.load(Ordering::Acquire));
        assert_eq!(dispatcher.into_vehicle().commands_handled(), 2);
        assert_eq!(board.last_off(5), Some(60));
        assert_eq!(board.last_off(0), Some(15));
    }

    #[test]
    fn test_write_fault_stops_node() {
        let board = SimulatedBoard::new();
        let (sub, queue) = CommandSubscriber::channel(DeliveryPolicy::LatestWins);
        let running = Arc::new(AtomicBool::new(true));
        let mut dispatcher = CommandDispatcher::new(queue, vehicle(&board), running.clone())
            .with_poll(Duration::from_millis(5));

        board.fail_next(2);
        assert!(sub.publish(DriveCommand::new(10.0, 10.0)));

        assert!(dispatcher.run().is_err());
        assert!(!running.load(Ordering::Acquire));

        drop(dispatcher.into_vehicle());
        assert!(!sub.publish(DriveCommand::new(20.0, 20.0)));
    }

    #[test]
    fn test_exits_when_running_cleared() {
        let board = SimulatedBoard::new();
        let (_sub, queue) = CommandSubscriber::channel(DeliveryPolicy::LatestWins);
        let running = Arc::new(AtomicBool::new(false));
        let mut dispatcher = CommandDispatcher::new(queue, vehicle(&board), running)
            .with_poll(Duration::from_millis(5));

        dispatcher.run().unwrap();
        assert_eq!(dispatcher.into_vehicle().commands_handled(), 0);
    }
}
