//! steering.rs
//! Steering servo output. Aux channels sit above the primary:
//! `ch+1` is energised for positive angles, `ch+2` for zero/negative.

use std::time::Duration;

use log::info;

use crate::actuator::controller::PulseController;
use crate::actuator::router::DirectionalOutput;
use crate::error::DriveResult;

const FORWARD_OFFSET: i32 = 1;
const REVERSE_OFFSET: i32 = 2;

pub struct PwmSteering {
    output: DirectionalOutput,
}

impl PwmSteering {
    pub fn new(controller: PulseController, calibration_delay: Duration) -> DriveResult<Self> {
        let output = DirectionalOutput::new(
            "Steer",
            controller,
            FORWARD_OFFSET,
            REVERSE_OFFSET,
            calibration_delay,
        )?;
        Ok(Self { output })
    }

    pub fn run(&mut self, steering: f64) -> DriveResult<()> {
        info!("steer : {}", steering);
        self.output.run(steering)
    }

    pub fn shutdown(&mut self) -> DriveResult<()> {
        self.output.shutdown()
    }

    pub fn output(&self) -> &DirectionalOutput {
        &self.output
    }
}
