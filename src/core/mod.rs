pub mod alerts;
pub mod capture;
pub mod config;
pub mod escalation;
pub mod model;
pub mod motion;
pub mod platform;
pub mod telemetry;
pub mod timer;
pub mod voice;
