// Command side: inbound drive messages, intake and dispatch to the vehicle.
pub mod message;
pub mod subscriber;
pub mod dispatcher;
