//! Error taxonomy for the actuator node.

use thiserror::Error;

/// Primary error type for the drive node
#[derive(Error, Debug)]
pub enum DriveError {
    /// A register write failed twice in a row (initial attempt + one retry)
    #[error("PWM write failed on channel {channel}: {message}")]
    Write {
        channel: u8,
        message: String,
    },

    /// Board not found or not answering at startup
    #[error("PWM board initialisation failed: {0}")]
    Init(String),

    /// Primary or auxiliary channel outside 0-15
    #[error("PWM channel {channel} out of range (0-15)")]
    InvalidChannel { channel: i32 },

    #[error("unsupported PWM frequency {0} Hz")]
    InvalidFrequency(f64),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DriveError {
    /// Write failures are the only errors a command can produce at runtime.
    pub fn is_write_fault(&self) -> bool {
        matches!(self, DriveError::Write { .. })
    }
}

pub type DriveResult<T> = Result<T, DriveError>;
