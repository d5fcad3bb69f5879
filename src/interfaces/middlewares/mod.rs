pub mod cors;
pub mod throttle;
