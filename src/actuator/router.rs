//! router.rs
//! Signed value -> (magnitude on primary channel, direction on two aux channels).
//!
//! The primary channel always receives `|pulse|`. Direction is encoded H-bridge
//! style: for a positive value the forward aux channel is driven full scale and
//! the reverse aux channel is released; zero and negative values do the opposite.

use std::{thread, time::Duration};

use log::info;

use crate::actuator::board::{CHANNEL_COUNT, MAX_TICK};
use crate::actuator::controller::{PulseController, PulseRange};
use crate::error::{DriveError, DriveResult};

/// Resolve `primary + offset` to a board channel.
pub fn aux_channel(primary: u8, offset: i32) -> DriveResult<u8> {
    let channel = primary as i32 + offset;
    if (0..CHANNEL_COUNT as i32).contains(&channel) {
        Ok(channel as u8)
    } else {
        Err(DriveError::InvalidChannel { channel })
    }
}

pub struct DirectionalOutput {
    label: &'static str,
    controller: PulseController,
    forward_aux: u8,
    reverse_aux: u8,
    range: PulseRange,
    last_value: f64,
}

impl DirectionalOutput {
    /// Bind aux channels, then send the zero pulse and give the ESC
    /// `calibration_delay` to arm before any command is accepted.
    pub fn new(
        label: &'static str,
        controller: PulseController,
        forward_offset: i32,
        reverse_offset: i32,
        calibration_delay: Duration,
    ) -> DriveResult<Self> {
        let forward_aux = aux_channel(controller.channel(), forward_offset)?;
        let reverse_aux = aux_channel(controller.channel(), reverse_offset)?;
        let range = controller.range();

        let mut output = Self {
            label,
            controller,
            forward_aux,
            reverse_aux,
            range,
            last_value: 0.0,
        };

        info!("Init {} ESC", output.label);
        output.controller.set_pulse(range.zero as f64)?;
        thread::sleep(calibration_delay);
        Ok(output)
    }

    /// Route one raw command value. The fractional part is dropped.
    pub fn run(&mut self, value: f64) -> DriveResult<()> {
        let pulse = value as i64;
        let magnitude = self.range.clamp_magnitude(pulse.saturating_abs());
        let bus = self.controller.bus();
        let primary = self.controller.channel();

        if value > 0.0 {
            bus.set_pwm(primary, 0, magnitude)?;
            bus.set_pwm(self.reverse_aux, 0, 0)?;
            bus.set_pwm(self.forward_aux, 0, MAX_TICK as i64)?;
        } else {
            bus.set_pwm(primary, 0, magnitude)?;
            bus.set_pwm(self.forward_aux, 0, 0)?;
            bus.set_pwm(self.reverse_aux, 0, MAX_TICK as i64)?;
        }
        self.last_value = value;
        Ok(())
    }

    /// Always writes a zero pulse, whatever was commanded before.
    pub fn shutdown(&mut self) -> DriveResult<()> {
        info!("[{}] stopping", self.label);
        self.run(self.range.zero as f64)
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn channel(&self) -> u8 {
        self.controller.channel()
    }

    pub fn forward_aux(&self) -> u8 {
        self.forward_aux
    }

    pub fn reverse_aux(&self) -> u8 {
        self.reverse_aux
    }

    pub fn last_value(&self) -> f64 {
        self.last_value
    }

    pub fn controller(&self) -> &PulseController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut PulseController {
        &mut self.controller
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aux_channel_bounds() {
        assert_eq!(aux_channel(0, 2).unwrap(), 2);
        assert_eq!(aux_channel(5, -2).unwrap(), 3);
        assert!(matches!(
            aux_channel(1, -2),
            Err(DriveError::InvalidChannel { channel: -1 })
        ));
        assert!(aux_channel(14, 2).is_err());
    }
}
