//! pca9685.rs
//! [`PwmDriver`] for a PCA9685 on a Linux i2c-dev bus (`/dev/i2c-N`).

use linux_embedded_hal::I2cdev;
use log::info;
use pwm_pca9685::{Channel, Pca9685};

use crate::actuator::board::PwmDriver;
use crate::error::{DriveError, DriveResult};

/// Internal oscillator of the PCA9685.
const OSCILLATOR_HZ: f64 = 25_000_000.0;
const TICKS_PER_PERIOD: f64 = 4096.0;

pub struct Pca9685Board {
    pwm: Pca9685<I2cdev>,
    bus: u8,
    address: u8,
}

impl Pca9685Board {
    /// Open `/dev/i2c-{bus}` and wake the board at `address`. No retry.
    pub fn open(bus: u8, address: u8) -> DriveResult<Self> {
        let path = format!("/dev/i2c-{}", bus);
        let dev = I2cdev::new(&path).map_err(|e| DriveError::Init(format!("{}: {:?}", path, e)))?;
        let mut pwm = Pca9685::new(dev, address)
            .map_err(|e| DriveError::Init(format!("0x{:02x} on {}: {:?}", address, path, e)))?;
        pwm.enable()
            .map_err(|e| DriveError::Init(format!("0x{:02x} on {}: {:?}", address, path, e)))?;

        info!("[Pca9685] board 0x{:02x} up on {}", address, path);
        Ok(Self { pwm, bus, address })
    }

    pub fn bus(&self) -> u8 {
        self.bus
    }

    pub fn address(&self) -> u8 {
        self.address
    }
}

/// Prescaler for `frequency_hz`, rounded to nearest. The chip accepts 3..=255.
pub fn prescale_for(frequency_hz: f64) -> DriveResult<u8> {
    if !(frequency_hz > 0.0) {
        return Err(DriveError::InvalidFrequency(frequency_hz));
    }
    let prescale = (OSCILLATOR_HZ / TICKS_PER_PERIOD / frequency_hz - 1.0 + 0.5).floor();
    if !(3.0..=255.0).contains(&prescale) {
        return Err(DriveError::InvalidFrequency(frequency_hz));
    }
    Ok(prescale as u8)
}

fn init_fault<E: std::fmt::Debug>(prescale: u8, e: E) -> DriveError {
    DriveError::Init(format!("prescale {}: {:?}", prescale, e))
}

fn to_channel(channel: u8) -> DriveResult<Channel> {
    let ch = match channel {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        other => {
            return Err(DriveError::InvalidChannel {
                channel: other as i32,
            });
        }
    };
    Ok(ch)
}

impl PwmDriver for Pca9685Board {
    fn set_pwm_freq(&mut self, frequency_hz: f64) -> DriveResult<()> {
        let prescale = prescale_for(frequency_hz)?;
        // prescale is only writable while the oscillator sleeps
        self.pwm.disable().map_err(|e| init_fault(prescale, e))?;
        self.pwm.set_prescale(prescale).map_err(|e| init_fault(prescale, e))?;
        self.pwm.enable().map_err(|e| init_fault(prescale, e))?;
        info!("[Pca9685] {} Hz (prescale {})", frequency_hz, prescale);
        Ok(())
    }

    fn set_pwm(&mut self, channel: u8, on: u16, off: u16) -> DriveResult<()> {
        let ch = to_channel(channel)?;
        self.pwm
            .set_channel_on_off(ch, on, off)
            .map_err(|e| DriveError::Write {
                channel,
                message: format!("{:?}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prescale_for_common_rates() {
        assert_eq!(prescale_for(60.0).unwrap(), 101);
        assert_eq!(prescale_for(50.0).unwrap(), 121);
        assert!(prescale_for(10.0).is_err());
        assert!(prescale_for(2000.0).is_err());
    }

    #[test]
    fn test_channel_mapping() {
        assert!(matches!(to_channel(15), Ok(Channel::C15)));
        assert!(to_channel(16).is_err());
    }
}
