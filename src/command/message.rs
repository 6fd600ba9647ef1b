//! message.rs
//! The drive command consumed by the node, one per input record.

use serde::{Deserialize, Serialize};

/// Inbound drive command. Both fields are raw pulse values; the sign selects
/// direction, the truncated magnitude becomes the primary pulse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveCommand {
    pub speed: f64,
    pub steering_angle: f64,
}

impl DriveCommand {
    pub fn new(speed: f64, steering_angle: f64) -> Self {
        Self {
            speed,
            steering_angle,
        }
    }

    pub fn stop() -> Self {
        Self::new(0.0, 0.0)
    }
}
