//! bus.rs
//! Shared handle to the one PWM board both actuators talk to.
//!
//! - every register write holds the bus lock for its whole duration, retry included
//! - a failed write is retried exactly once with identical arguments
//! - off/on ticks are clamped into the register range before they reach the driver
//! - the last (on, off) pair per channel is kept so outputs can be re-applied

use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::actuator::board::{PwmDriver, CHANNEL_COUNT, MAX_TICK};
use crate::error::{DriveError, DriveResult};
use crate::utils::journal::WriteJournal;

struct BusState {
    driver: Box<dyn PwmDriver>,
    frequency_hz: Option<f64>,
    last_output: [Option<(u16, u16)>; CHANNEL_COUNT],
    journal: Option<Arc<WriteJournal>>,
}

/// Cloneable, lock-serialised access to a PWM board.
#[derive(Clone)]
pub struct SharedBus {
    inner: Arc<Mutex<BusState>>,
}

impl SharedBus {
    pub fn new(driver: impl PwmDriver + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusState {
                driver: Box::new(driver),
                frequency_hz: None,
                last_output: [None; CHANNEL_COUNT],
                journal: None,
            })),
        }
    }

    /// Record every successful write into `journal`.
    pub fn with_journal(self, journal: Arc<WriteJournal>) -> Self {
        self.inner.lock().journal = Some(journal);
        self
    }

    /// Program the board-wide PWM frequency. Re-programming the same value is a no-op.
    pub fn set_pwm_freq(&self, frequency_hz: f64) -> DriveResult<()> {
        let mut state = self.inner.lock();
        match state.frequency_hz {
            Some(current) if current == frequency_hz => return Ok(()),
            Some(current) => warn!(
                "[Bus] PWM frequency changed {} Hz -> {} Hz; affects every channel",
                current, frequency_hz
            ),
            None => {}
        }
        state.driver.set_pwm_freq(frequency_hz)?;
        state.frequency_hz = Some(frequency_hz);
        Ok(())
    }

    pub fn frequency(&self) -> Option<f64> {
        self.inner.lock().frequency_hz
    }

    /// Write one channel. Ticks outside 0..=4095 are clamped.
    pub fn set_pwm(&self, channel: u8, on: i64, off: i64) -> DriveResult<()> {
        if channel as usize >= CHANNEL_COUNT {
            return Err(DriveError::InvalidChannel {
                channel: channel as i32,
            });
        }
        let on = clamp_tick(channel, on);
        let off = clamp_tick(channel, off);

        let mut state = self.inner.lock();
        write_with_retry(state.driver.as_mut(), channel, on, off)?;
        state.last_output[channel as usize] = Some((on, off));
        if let Some(journal) = &state.journal {
            journal.record(channel, on, off);
        }
        Ok(())
    }

    pub fn last_output(&self, channel: u8) -> Option<(u16, u16)> {
        self.inner
            .lock()
            .last_output
            .get(channel as usize)
            .copied()
            .flatten()
    }

    /// Write every channel's last output again. Returns how many channels were refreshed.
    pub fn reapply_outputs(&self) -> DriveResult<usize> {
        let mut state = self.inner.lock();
        let held: Vec<(u8, (u16, u16))> = state
            .last_output
            .iter()
            .enumerate()
            .filter_map(|(ch, out)| out.map(|o| (ch as u8, o)))
            .collect();

        for &(channel, (on, off)) in &held {
            write_with_retry(state.driver.as_mut(), channel, on, off)?;
            if let Some(journal) = &state.journal {
                journal.record(channel, on, off);
            }
        }
        Ok(held.len())
    }
}

fn write_with_retry(driver: &mut dyn PwmDriver, channel: u8, on: u16, off: u16) -> DriveResult<()> {
    if let Err(first) = driver.set_pwm(channel, on, off) {
        warn!("[Bus] write ch{} failed ({}), retrying once", channel, first);
        return driver.set_pwm(channel, on, off).map_err(|e| match e {
            DriveError::Write { .. } => e,
            other => DriveError::Write {
                channel,
                message: other.to_string(),
            },
        });
    }
    debug!("[Bus] ch{} <- on={} off={}", channel, on, off);
    Ok(())
}

fn clamp_tick(channel: u8, tick: i64) -> u16 {
    let clamped = tick.clamp(0, MAX_TICK as i64);
    if clamped != tick {
        warn!(
            "[Bus] tick {} on ch{} outside 0..={}, clamped to {}",
            tick, channel, MAX_TICK, clamped
        );
    }
    clamped as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::board::{ChannelWrite, SimulatedBoard};

    #[test]
    fn test_retries_exactly_once() {
        let board = SimulatedBoard::new();
        let bus = SharedBus::new(board.clone());

        board.fail_next(1);
        bus.set_pwm(2, 0, 300).unwrap();
        assert_eq!(board.failed_attempts(), 1);
        assert_eq!(
            board.writes(),
            vec![ChannelWrite { channel: 2, on: 0, off: 300 }]
        );

        board.fail_next(2);
        let err = bus.set_pwm(2, 0, 400).unwrap_err();
        assert!(err.is_write_fault());
        assert_eq!(board.failed_attempts(), 3);
        // the failed write must not replace the held output
        assert_eq!(bus.last_output(2), Some((0, 300)));
    }

    #[test]
    fn test_clamps_ticks() {
        let board = SimulatedBoard::new();
        let bus = SharedBus::new(board.clone());

        bus.set_pwm(0, 0, 9000).unwrap();
        bus.set_pwm(1, 0, -25).unwrap();

        assert_eq!(board.last_off(0), Some(4095));
        assert_eq!(board.last_off(1), Some(0));
    }

    #[test]
    fn test_rejects_channel_past_board() {
        let bus = SharedBus::new(SimulatedBoard::new());
        assert!(matches!(
            bus.set_pwm(16, 0, 1),
            Err(DriveError::InvalidChannel { channel: 16 })
        ));
    }

    #[test]
    fn test_frequency_programmed_once() {
        let board = SimulatedBoard::new();
        let bus = SharedBus::new(board.clone());

        bus.set_pwm_freq(60.0).unwrap();
        bus.set_pwm_freq(60.0).unwrap();
        assert_eq!(bus.frequency(), Some(60.0));
        assert_eq!(board.frequency(), Some(60.0));
    }

    #[test]
    fn test_reapply_outputs_rewrites_held_values() {
        let board = SimulatedBoard::new();
        let bus = SharedBus::new(board.clone());
        bus.set_pwm(0, 0, 10).unwrap();
        bus.set_pwm(5, 0, 50).unwrap();
        board.clear();

        assert_eq!(bus.reapply_outputs().unwrap(), 2);
        assert_eq!(
            board.writes(),
            vec![
                ChannelWrite { channel: 0, on: 0, off: 10 },
                ChannelWrite { channel: 5, on: 0, off: 50 },
            ]
        );
    }

    #[test]
    fn test_reapplied_writes_are_journaled() {
        let journal = Arc::new(WriteJournal::new());
        let bus = SharedBus::new(SimulatedBoard::new()).with_journal(journal.clone());
        bus.set_pwm(3, 0, 1200).unwrap();
        assert_eq!(journal.drain().len(), 1);

        assert_eq!(bus.reapply_outputs().unwrap(), 1);
        let entries = journal.drain();
        assert_eq!(entries.len(), 1);
        assert_eq!((entries[0].channel, entries[0].on, entries[0].off), (3, 0, 1200));
    }
}
