//! In-memory time-series backend for testing and simulated deployments.
//!
//! The handle can take the backend offline, make it reject writes with a
//! status code, or slow every call down to exercise the writer's timeout.

use chrono::{DateTime, Utc};
use metrogate_core::constants::MEASUREMENT_ACCESS;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::TimeSeriesBackend;
use crate::error::{Result, TelemetryWriteError};
use crate::history::AccessRecord;
use crate::point::{FieldValue, TelemetryPoint};

#[derive(Debug)]
struct MockState {
    reachable: bool,
    reject: Option<(u16, String)>,
    latency: Duration,
    written: Vec<TelemetryPoint>,
    write_calls: u64,
}

/// Mock backend.
///
/// # Examples
///
/// ```
/// use metrogate_telemetry::backend::TimeSeriesBackend;
/// use metrogate_telemetry::mock::MockBackend;
/// use metrogate_telemetry::TelemetryPoint;
///
/// #[tokio::main]
/// async fn main() {
///     let (backend, handle) = MockBackend::new();
///     let point = TelemetryPoint::builder("metro_access")
///         .field("access_granted", true)
///         .build()
///         .unwrap();
///
///     handle.set_reachable(false);
///     assert!(backend.write(&[point.clone()]).await.is_err());
///
///     handle.set_reachable(true);
///     backend.write(&[point]).await.unwrap();
///     assert_eq!(handle.written().len(), 1);
/// }
/// ```
#[derive(Debug)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Create a reachable mock backend with no latency.
    pub fn new() -> (Self, MockBackendHandle) {
        let state = Arc::new(Mutex::new(MockState {
            reachable: true,
            reject: None,
            latency: Duration::ZERO,
            written: Vec::new(),
            write_calls: 0,
        }));

        (
            Self {
                state: state.clone(),
            },
            MockBackendHandle { state },
        )
    }

    async fn delay(&self) {
        let latency = self.state.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl TimeSeriesBackend for MockBackend {
    async fn write(&self, points: &[TelemetryPoint]) -> std::result::Result<(), TelemetryWriteError> {
        self.delay().await;

        let mut state = self.state.lock();
        state.write_calls += 1;
        if !state.reachable {
            return Err(TelemetryWriteError::unreachable("mock backend offline"));
        }
        if let Some((status, body)) = &state.reject {
            return Err(TelemetryWriteError::rejected(*status, body.clone()));
        }

        state.written.extend_from_slice(points);
        Ok(())
    }

    async fn ping(&self) -> std::result::Result<(), TelemetryWriteError> {
        self.delay().await;

        if self.state.lock().reachable {
            Ok(())
        } else {
            Err(TelemetryWriteError::unreachable("mock backend offline"))
        }
    }

    async fn query_access(
        &self,
        since: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<AccessRecord>> {
        self.delay().await;

        let state = self.state.lock();
        if !state.reachable {
            return Err(TelemetryWriteError::unreachable("mock backend offline").into());
        }

        let mut records: Vec<AccessRecord> = state
            .written
            .iter()
            .filter(|point| point.measurement() == MEASUREMENT_ACCESS)
            .filter(|point| point.timestamp() >= since)
            .filter_map(|point| {
                let granted = point.field("access_granted").and_then(FieldValue::as_bool)?;
                Some(AccessRecord {
                    time: point.timestamp(),
                    user: point.tag("user").unwrap_or_default().to_string(),
                    door: point.tag("door").unwrap_or_default().to_string(),
                    granted,
                })
            })
            .collect();

        records.sort_by(|a, b| b.time.cmp(&a.time));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}

/// Handle for controlling a mock backend.
#[derive(Debug, Clone)]
pub struct MockBackendHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockBackendHandle {
    /// Take the backend offline (`false`) or bring it back.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    /// Reject every write with `status` until cleared with `None`.
    pub fn reject_with(&self, status: Option<u16>) {
        self.state.lock().reject = status.map(|status| (status, format!("mock rejection {status}")));
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Every point accepted so far, in write order.
    pub fn written(&self) -> Vec<TelemetryPoint> {
        self.state.lock().written.clone()
    }

    /// Number of write attempts, failed ones included.
    pub fn write_calls(&self) -> u64 {
        self.state.lock().write_calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access(user: &str, granted: bool, at: DateTime<Utc>) -> TelemetryPoint {
        TelemetryPoint::builder(MEASUREMENT_ACCESS)
            .tag("door", "canceladora_1")
            .tag("user", user)
            .field("access_granted", granted)
            .timestamp(at)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_reject_with_status() {
        let (backend, handle) = MockBackend::new();
        handle.reject_with(Some(400));

        let result = backend.write(&[access("card-42", true, Utc::now())]).await;
        assert_eq!(
            result,
            Err(TelemetryWriteError::rejected(400, "mock rejection 400"))
        );
        assert_eq!(handle.write_calls(), 1);
        assert!(handle.written().is_empty());

        handle.reject_with(None);
        backend.write(&[access("card-42", true, Utc::now())]).await.unwrap();
        assert_eq!(handle.written().len(), 1);
    }

    #[tokio::test]
    async fn test_query_access_newest_first() {
        let (backend, _handle) = MockBackend::new();
        let now = Utc::now();
        let points = vec![
            access("old", true, now - chrono::Duration::hours(2)),
            access("card-42", true, now - chrono::Duration::seconds(10)),
            access("card-999", false, now - chrono::Duration::seconds(5)),
        ];
        backend.write(&points).await.unwrap();

        let records = backend
            .query_access(now - chrono::Duration::minutes(5), None)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].user, "card-999");
        assert_eq!(records[1].user, "card-42");

        let limited = backend
            .query_access(now - chrono::Duration::days(1), Some(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency() {
        let (backend, handle) = MockBackend::new();
        handle.set_latency(Duration::from_secs(3));

        let started = tokio::time::Instant::now();
        backend.ping().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
