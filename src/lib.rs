//! # donkey_control
//! Drives an RC car's steering servo and throttle ESC through a PCA9685 PWM board.
//!
//! Pipeline: command intake → dispatcher → vehicle (throttle, then steering) → shared PWM bus.
//! The bus is one owned handle injected into both outputs; every register write is
//! serialised by its lock and retried once on failure.

pub mod actuator;
pub mod command;
pub mod config;
pub mod error;
pub mod utils;
