//! Node configuration: deployment defaults plus command-line overrides.
//! Fixed at startup; nothing here is reconfigurable while running.

use std::{path::PathBuf, time::Duration};

use structopt::StructOpt;

use crate::actuator::board::{CHANNEL_COUNT, MAX_TICK};
use crate::actuator::controller::PulseRange;
use crate::error::{DriveError, DriveResult};

pub const DEFAULT_NODE_NAME: &str = "donkey_ros";
pub const DEFAULT_STEERING_CHANNEL: u8 = 0;
pub const DEFAULT_THROTTLE_CHANNEL: u8 = 5;
pub const DEFAULT_ADDRESS: u8 = 0x40;
pub const DEFAULT_I2C_BUS: u8 = 1;
pub const DEFAULT_FREQUENCY_HZ: f64 = 60.0;
pub const DEFAULT_RATE_HZ: f64 = 10.0;
/// Oscillator settle time after programming the frequency.
pub const DEFAULT_INIT_DELAY: Duration = Duration::from_millis(100);
/// Time the ESC needs to arm on the zero pulse.
pub const DEFAULT_CALIBRATION_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub name: String,
    pub i2c_bus: u8,
    pub address: u8,
    pub frequency_hz: f64,
    pub steering_channel: u8,
    pub throttle_channel: u8,
    pub pulse_range: PulseRange,
    pub init_delay: Duration,
    pub calibration_delay: Duration,
    pub rate_hz: f64,
    pub input: Option<PathBuf>,
    pub journal: Option<PathBuf>,
    pub dry_run: bool,
    pub hold_refresh: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NODE_NAME.to_string(),
            i2c_bus: DEFAULT_I2C_BUS,
            address: DEFAULT_ADDRESS,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            steering_channel: DEFAULT_STEERING_CHANNEL,
            throttle_channel: DEFAULT_THROTTLE_CHANNEL,
            pulse_range: PulseRange::default(),
            init_delay: DEFAULT_INIT_DELAY,
            calibration_delay: DEFAULT_CALIBRATION_DELAY,
            rate_hz: DEFAULT_RATE_HZ,
            input: None,
            journal: None,
            dry_run: false,
            hold_refresh: false,
        }
    }
}

impl NodeConfig {
    /// Steering occupies `ch..=ch+2`, throttle `ch-2..=ch`; both blocks must
    /// fit on the board and must not overlap.
    pub fn validate(&self) -> DriveResult<()> {
        let steering = self.steering_channel as i32..=self.steering_channel as i32 + 2;
        let throttle = self.throttle_channel as i32 - 2..=self.throttle_channel as i32;

        for block in [&steering, &throttle] {
            for ch in [*block.start(), *block.end()] {
                if !(0..CHANNEL_COUNT as i32).contains(&ch) {
                    return Err(DriveError::InvalidChannel { channel: ch });
                }
            }
        }
        if steering.start() <= throttle.end() && throttle.start() <= steering.end() {
            return Err(DriveError::Config(format!(
                "steering channels {:?} overlap throttle channels {:?}",
                steering, throttle
            )));
        }
        if !(self.frequency_hz > 0.0) {
            return Err(DriveError::InvalidFrequency(self.frequency_hz));
        }
        if !(self.rate_hz > 0.0) {
            return Err(DriveError::Config(format!("rate must be positive, got {}", self.rate_hz)));
        }
        let r = self.pulse_range;
        if !(r.min <= r.zero && r.zero <= r.max) || r.max > MAX_TICK as i64 {
            return Err(DriveError::Config(format!("invalid pulse range {:?}", r)));
        }
        Ok(())
    }

    /// Period of the node's idle loop.
    pub fn rate_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz)
    }
}

/// Accepts `0x40`, `0X40` or plain decimal `64`.
pub fn parse_address(s: &str) -> Result<u8, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

#[derive(StructOpt, Debug)]
#[structopt(name = "donkey_control", about = "Drive an RC car's steering servo and ESC through a PCA9685")]
pub struct Opts {
    /// I2C bus number (/dev/i2c-N)
    #[structopt(short = "b", long, default_value = "1")]
    pub bus: u8,

    /// PCA9685 address
    #[structopt(short = "a", long, parse(try_from_str = parse_address), default_value = "0x40")]
    pub address: u8,

    /// PWM frequency in Hz
    #[structopt(short = "f", long, default_value = "60")]
    pub frequency: f64,

    #[structopt(long, default_value = "0")]
    pub steering_channel: u8,

    #[structopt(long, default_value = "5")]
    pub throttle_channel: u8,

    /// ESC arming time in milliseconds
    #[structopt(long, default_value = "1000")]
    pub calibration_ms: u64,

    /// Board settle time in milliseconds
    #[structopt(long, default_value = "100")]
    pub settle_ms: u64,

    /// Replay commands from a file instead of reading stdin
    #[structopt(short = "i", long, parse(from_os_str))]
    pub input: Option<PathBuf>,

    /// Write a CSV journal of every register write
    #[structopt(short = "j", long, parse(from_os_str))]
    pub journal: Option<PathBuf>,

    /// Use an in-memory board instead of the PCA9685
    #[structopt(long)]
    pub dry_run: bool,

    /// Re-write the last output of every channel on each tick
    #[structopt(long)]
    pub hold_refresh: bool,
}

impl Opts {
    pub fn into_config(self) -> DriveResult<NodeConfig> {
        let config = NodeConfig {
            i2c_bus: self.bus,
            address: self.address,
            frequency_hz: self.frequency,
            steering_channel: self.steering_channel,
            throttle_channel: self.throttle_channel,
            init_delay: Duration::from_millis(self.settle_ms),
            calibration_delay: Duration::from_millis(self.calibration_ms),
            input: self.input,
            journal: self.journal,
            dry_run: self.dry_run,
            hold_refresh: self.hold_refresh,
            ..NodeConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}
