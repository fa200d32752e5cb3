//! Telemetry for the metrogate turnstile.
//!
//! Every access attempt, login, door transition and periodic status snapshot
//! becomes a [`TelemetryPoint`]. Points go through a bounded in-memory
//! [`pipeline`] so producers never wait on the network; a writer task ships
//! them to a [`TimeSeriesBackend`] (InfluxDB v2 over HTTP, or an in-memory
//! mock).
//!
//! # Modules
//!
//! - [`point`]: point model and line-protocol encoding
//! - [`measurements`]: the four measurement schemas
//! - [`pipeline`]: buffer, writer task and statistics
//! - [`backend`], [`influx`], [`mock`]: backend contract and implementations
//! - [`history`]: access history queries

pub mod backend;
pub mod error;
pub mod history;
pub mod influx;
pub mod measurements;
pub mod mock;
pub mod pipeline;
pub mod point;

pub use backend::{AnyBackend, TimeSeriesBackend};
pub use error::{Result, TelemetryError, TelemetryWriteError};
pub use history::{AccessRecord, AccessStatistics, access_statistics, recent_access};
pub use influx::{InfluxBackend, InfluxConfig};
pub use pipeline::{PipelineConfig, PipelineStats, TelemetryHandle, TelemetryPipeline, TelemetryWriter};
pub use point::{FieldValue, PointBuilder, TelemetryPoint};
