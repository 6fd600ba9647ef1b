//! vehicle.rs
//! Command dispatch for the car: one throttle output, one steering output,
//! both on the same PWM board.

use log::{error, info};

use crate::actuator::bus::SharedBus;
use crate::actuator::controller::PulseController;
use crate::actuator::steering::PwmSteering;
use crate::actuator::throttle::PwmThrottle;
use crate::command::message::DriveCommand;
use crate::config::NodeConfig;
use crate::error::DriveResult;

pub struct Vehicle {
    name: String,
    steering: PwmSteering,
    throttle: PwmThrottle,
    commands_handled: u64,
}

impl Vehicle {
    /// Bring up steering then throttle. Each goes through the full
    /// frequency -> settle -> zero pulse -> calibration sequence.
    pub fn new(bus: SharedBus, config: &NodeConfig) -> DriveResult<Self> {
        let steering_controller = PulseController::new(
            bus.clone(),
            config.steering_channel,
            config.address,
            config.frequency_hz,
            config.init_delay,
        )?
        .with_range(config.pulse_range);
        let steering = PwmSteering::new(steering_controller, config.calibration_delay)?;
        info!("Steering controller ready on ch{}", config.steering_channel);

        let throttle_controller = PulseController::new(
            bus,
            config.throttle_channel,
            config.address,
            config.frequency_hz,
            config.init_delay,
        )?
        .with_range(config.pulse_range);
        let throttle = PwmThrottle::new(throttle_controller, config.calibration_delay)?;
        info!("Throttle controller ready on ch{}", config.throttle_channel);

        Ok(Self::from_parts(&config.name, steering, throttle))
    }

    pub fn from_parts(name: &str, steering: PwmSteering, throttle: PwmThrottle) -> Self {
        Self {
            name: name.to_string(),
            steering,
            throttle,
            commands_handled: 0,
        }
    }

    /// Throttle first, then steering. Values are passed through untouched.
    pub fn handle(&mut self, cmd: &DriveCommand) -> DriveResult<()> {
        info!(
            "speed_pulse : {} / steering_pulse : {}",
            cmd.speed, cmd.steering_angle
        );
        self.throttle.run(cmd.speed)?;
        self.steering.run(cmd.steering_angle)?;
        self.commands_handled += 1;
        Ok(())
    }

    /// Zero both outputs. Steering is still attempted if the throttle write fails;
    /// the first error is returned.
    pub fn shutdown(&mut self) -> DriveResult<()> {
        info!("[{}] stopping vehicle", self.name);
        let throttle = self.throttle.shutdown();
        if let Err(e) = &throttle {
            error!("[{}] throttle stop failed: {}", self.name, e);
        }
        let steering = self.steering.shutdown();
        if let Err(e) = &steering {
            error!("[{}] steering stop failed: {}", self.name, e);
        }
        throttle.and(steering)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commands_handled(&self) -> u64 {
        self.commands_handled
    }

    pub fn steering(&self) -> &PwmSteering {
        &self.steering
    }

    pub fn throttle(&self) -> &PwmThrottle {
        &self.throttle
    }
}
