// Actuator side: PWM board access, pulse controllers and the steering/throttle outputs.
pub mod board;
pub mod bus;
pub mod controller;
pub mod router;
pub mod steering;
pub mod throttle;
pub mod vehicle;

#[cfg(feature = "pca9685")]
pub mod pca9685;
