//! Time-series backend contract and enum dispatch.
//!
//! The pipeline writer is spawned as a task, so it needs a concrete `Send`
//! backend type. [`AnyBackend`] provides one while keeping the HTTP backend
//! and the mock interchangeable.

#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};

use crate::error::{Result, TelemetryWriteError};
use crate::history::AccessRecord;
use crate::influx::InfluxBackend;
use crate::mock::MockBackend;
use crate::point::TelemetryPoint;

/// Write and query contract of the time-series store.
///
/// # Examples
///
/// ```no_run
/// use metrogate_telemetry::backend::TimeSeriesBackend;
/// use metrogate_telemetry::TelemetryPoint;
///
/// async fn flush<B: TimeSeriesBackend>(backend: &B, points: &[TelemetryPoint]) -> bool {
///     backend.write(points).await.is_ok()
/// }
/// ```
pub trait TimeSeriesBackend: Send + Sync {
    /// Write one batch. The batch is accepted or rejected as a whole.
    async fn write(&self, points: &[TelemetryPoint]) -> std::result::Result<(), TelemetryWriteError>;

    /// Cheap reachability probe.
    async fn ping(&self) -> std::result::Result<(), TelemetryWriteError>;

    /// Latest `metro_access` records since `since`, newest first.
    async fn query_access(
        &self,
        since: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<AccessRecord>>;
}

/// Enum wrapper for backend dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyBackend {
    /// InfluxDB v2 over HTTP.
    Influx(InfluxBackend),
    /// In-memory backend for development and testing.
    Mock(MockBackend),
}

impl TimeSeriesBackend for AnyBackend {
    async fn write(&self, points: &[TelemetryPoint]) -> std::result::Result<(), TelemetryWriteError> {
        match self {
            Self::Influx(backend) => backend.write(points).await,
            Self::Mock(backend) => backend.write(points).await,
        }
    }

    async fn ping(&self) -> std::result::Result<(), TelemetryWriteError> {
        match self {
            Self::Influx(backend) => backend.ping().await,
            Self::Mock(backend) => backend.ping().await,
        }
    }

    async fn query_access(
        &self,
        since: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<AccessRecord>> {
        match self {
            Self::Influx(backend) => backend.query_access(since, limit).await,
            Self::Mock(backend) => backend.query_access(since, limit).await,
        }
    }
}

impl From<InfluxBackend> for AnyBackend {
    fn from(backend: InfluxBackend) -> Self {
        Self::Influx(backend)
    }
}

impl From<MockBackend> for AnyBackend {
    fn from(backend: MockBackend) -> Self {
        Self::Mock(backend)
    }
}
