//! board.rs
//! PWM driver seam plus an in-memory board used for dry runs and tests.
//!
//! A `PwmDriver` only knows two things: the PWM frequency of the whole board
//! and per-channel on/off ticks (0-4095 within one period).

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::error::{DriveError, DriveResult};

/// Number of output channels on a PCA9685.
pub const CHANNEL_COUNT: usize = 16;

/// Largest tick value a channel register accepts.
pub const MAX_TICK: u16 = 4095;

/// Register-level access to a PWM board.
pub trait PwmDriver: Send {
    fn set_pwm_freq(&mut self, frequency_hz: f64) -> DriveResult<()>;

    fn set_pwm(&mut self, channel: u8, on: u16, off: u16) -> DriveResult<()>;
}

/// A single register write as seen by the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelWrite {
    pub channel: u8,
    pub on: u16,
    pub off: u16,
}

#[derive(Debug, Default)]
struct BoardState {
    frequency_hz: Option<f64>,
    writes: Vec<ChannelWrite>,
    pending_faults: usize,
    failed_attempts: usize,
}

/// Board that keeps every write in memory.
///
/// Clones share state, so a test can keep one handle while the bus owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBoard {
    state: Arc<Mutex<BoardState>>,
}

impl SimulatedBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail.
    pub fn fail_next(&self, count: usize) {
        self.state.lock().pending_faults = count;
    }

    pub fn frequency(&self) -> Option<f64> {
        self.state.lock().frequency_hz
    }

    pub fn writes(&self) -> Vec<ChannelWrite> {
        self.state.lock().writes.clone()
    }

    /// Last off tick written to `channel`, if any.
    pub fn last_off(&self, channel: u8) -> Option<u16> {
        self.state
            .lock()
            .writes
            .iter()
            .rev()
            .find(|w| w.channel == channel)
            .map(|w| w.off)
    }

    pub fn failed_attempts(&self) -> usize {
        self.state.lock().failed_attempts
    }

    pub fn clear(&self) {
        self.state.lock().writes.clear();
    }
}

impl PwmDriver for SimulatedBoard {
    fn set_pwm_freq(&mut self, frequency_hz: f64) -> DriveResult<()> {
        if !(frequency_hz > 0.0) {
            return Err(DriveError::InvalidFrequency(frequency_hz));
        }
        self.state.lock().frequency_hz = Some(frequency_hz);
        Ok(())
    }

    fn set_pwm(&mut self, channel: u8, on: u16, off: u16) -> DriveResult<()> {
        let mut state = self.state.lock();
        if state.pending_faults > 0 {
            state.pending_faults -= 1;
            state.failed_attempts += 1;
            return Err(DriveError::Write {
                channel,
                message: "simulated bus fault".into(),
            });
        }
        debug!("[SimulatedBoard] ch{} on={} off={}", channel, on, off);
        state.writes.push(ChannelWrite { channel, on, off });
        Ok(())
    }
}
