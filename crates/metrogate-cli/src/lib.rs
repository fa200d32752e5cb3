//! Daemon plumbing for the `metrogate` binary: configuration and task wiring.

pub mod config;
pub mod daemon;

pub use config::Config;
pub use daemon::Daemon;
