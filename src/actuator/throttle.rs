//! throttle.rs
//! Throttle ESC output. Aux channels sit below the primary (mirrored offsets
//! from steering): `ch-1` is energised for forward, `ch-2` for zero/reverse.

use std::time::Duration;

use log::info;

use crate::actuator::controller::PulseController;
use crate::actuator::router::DirectionalOutput;
use crate::error::DriveResult;

const FORWARD_OFFSET: i32 = -1;
const REVERSE_OFFSET: i32 = -2;

pub struct PwmThrottle {
    output: DirectionalOutput,
}

impl PwmThrottle {
    pub fn new(controller: PulseController, calibration_delay: Duration) -> DriveResult<Self> {
        let output = DirectionalOutput::new(
            "Throttle",
            controller,
            FORWARD_OFFSET,
            REVERSE_OFFSET,
            calibration_delay,
        )?;
        Ok(Self { output })
    }

    pub fn run(&mut self, throttle: f64) -> DriveResult<()> {
        info!("throttle : {}", throttle);
        self.output.run(throttle)
    }

    pub fn shutdown(&mut self) -> DriveResult<()> {
        self.output.shutdown()
    }

    pub fn output(&self) -> &DirectionalOutput {
        &self.output
    }

    /// Ramp-limited write on the primary channel only.
    pub fn ramp_to(&mut self, pulse: f64) -> DriveResult<f64> {
        self.output.controller_mut().run(pulse)
    }
}
