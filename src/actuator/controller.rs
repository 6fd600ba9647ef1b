//! controller.rs
//! Per-channel pulse controller bound to one output of the shared PWM board.
//!
//! Pulses are expressed in ticks at the board's 60 Hz reference frequency and
//! scaled by `frequency / 60` before they are written.
//!
//! Ramp behaviour: when a new target is more than 40 ticks away from the last
//! written pulse, the written pulse is pushed a further `0.7 * diff` in the
//! direction of travel. This amplifies large jumps instead of damping them and
//! is kept as-is to match the deployed cars.

use std::{thread, time::Duration};

use log::{debug, info, warn};

use crate::actuator::board::CHANNEL_COUNT;
use crate::actuator::bus::SharedBus;
use crate::error::{DriveError, DriveResult};

/// Frequency the pulse values are calibrated against.
pub const REFERENCE_FREQUENCY_HZ: f64 = 60.0;

/// Jumps larger than this (in ticks) trigger the ramp adjustment.
pub const RAMP_THRESHOLD: f64 = 40.0;
pub const RAMP_GAIN: f64 = 0.7;

/// Signed pulse limits for one actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseRange {
    pub max: i64,
    pub min: i64,
    pub zero: i64,
}

impl Default for PulseRange {
    fn default() -> Self {
        Self {
            max: 4095,
            min: -4095,
            zero: 0,
        }
    }
}

impl PulseRange {
    /// Clamp a signed pulse into `[min, max]`.
    pub fn clamp(&self, pulse: f64) -> f64 {
        let clamped = pulse.clamp(self.min as f64, self.max as f64);
        if clamped != pulse {
            warn!(
                "pulse {} outside [{}, {}], clamped to {}",
                pulse, self.min, self.max, clamped
            );
        }
        clamped
    }

    /// Clamp an unsigned magnitude to `max`.
    pub fn clamp_magnitude(&self, magnitude: i64) -> i64 {
        if magnitude > self.max {
            warn!("pulse magnitude {} above max {}, clamped", magnitude, self.max);
            self.max
        } else {
            magnitude
        }
    }
}

/// `pulse * frequency / 60`
#[inline]
pub fn scale_pulse(pulse: f64, frequency_hz: f64) -> f64 {
    pulse * (frequency_hz / REFERENCE_FREQUENCY_HZ)
}

/// Ramp adjustment applied by [`PulseController::run`].
#[inline]
pub fn ramp(pulse: f64, prev_pulse: f64) -> f64 {
    let diff = pulse - prev_pulse;
    if diff.abs() > RAMP_THRESHOLD {
        pulse + RAMP_GAIN * diff
    } else {
        pulse
    }
}

pub struct PulseController {
    bus: SharedBus,
    channel: u8,
    address: u8,
    frequency_hz: f64,
    pwm_scale: f64,
    range: PulseRange,
    pulse: f64,
    prev_pulse: f64,
}

impl PulseController {
    /// Program the board frequency, then wait `init_delay` before anything is
    /// written. Some ESCs (Tamiya TBLE-02) twitch if the first pulse arrives
    /// while the oscillator is still settling.
    pub fn new(
        bus: SharedBus,
        channel: u8,
        address: u8,
        frequency_hz: f64,
        init_delay: Duration,
    ) -> DriveResult<Self> {
        if channel as usize >= CHANNEL_COUNT {
            return Err(DriveError::InvalidChannel {
                channel: channel as i32,
            });
        }
        if !(frequency_hz > 0.0) {
            return Err(DriveError::InvalidFrequency(frequency_hz));
        }

        bus.set_pwm_freq(frequency_hz)?;
        thread::sleep(init_delay);
        info!(
            "[PulseController] ch{} @0x{:02x} ready, {} Hz (scale {:.3})",
            channel,
            address,
            frequency_hz,
            frequency_hz / REFERENCE_FREQUENCY_HZ
        );

        Ok(Self {
            bus,
            channel,
            address,
            frequency_hz,
            pwm_scale: frequency_hz / REFERENCE_FREQUENCY_HZ,
            range: PulseRange::default(),
            pulse: 0.0,
            prev_pulse: 0.0,
        })
    }

    pub fn with_range(mut self, range: PulseRange) -> Self {
        self.range = range;
        self
    }

    /// Write `pulse` (reference-frequency ticks) to the bound channel.
    pub fn set_pwm(&mut self, pulse: f64) -> DriveResult<()> {
        let pulse = self.range.clamp(pulse);
        let ticks = (pulse * self.pwm_scale) as i64;
        self.bus.set_pwm(self.channel, 0, ticks)
    }

    /// Apply the ramp adjustment, write, and remember what was written.
    /// Returns the pulse that went out.
    pub fn run(&mut self, pulse: f64) -> DriveResult<f64> {
        let adjusted = self.range.clamp(ramp(pulse, self.prev_pulse));
        if adjusted != pulse {
            debug!(
                "[PulseController] ch{} ramp {} -> {} (prev {})",
                self.channel, pulse, adjusted, self.prev_pulse
            );
        }
        self.set_pwm(adjusted)?;
        self.pulse = adjusted;
        self.prev_pulse = adjusted;
        Ok(adjusted)
    }

    /// Write `pulse` without ramping and make it the new reference point.
    pub fn set_pulse(&mut self, pulse: f64) -> DriveResult<()> {
        self.set_pwm(pulse)?;
        self.pulse = self.range.clamp(pulse);
        self.prev_pulse = self.pulse;
        Ok(())
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn frequency(&self) -> f64 {
        self.frequency_hz
    }

    #[inline]
    pub fn scale(&self) -> f64 {
        self.pwm_scale
    }

    pub fn range(&self) -> PulseRange {
        self.range
    }

    pub fn pulse(&self) -> f64 {
        self.pulse
    }

    pub fn prev_pulse(&self) -> f64 {
        self.prev_pulse
    }

    pub fn bus(&self) -> &SharedBus {
        &self.bus
    }
}
