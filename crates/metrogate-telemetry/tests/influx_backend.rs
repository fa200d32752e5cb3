//! Integration tests for InfluxBackend
//!
//! A minimal HTTP responder on a local TcpListener stands in for InfluxDB,
//! so these tests exercise real request encoding and status handling.

use chrono::{TimeZone, Utc};
use metrogate_telemetry::{
    InfluxBackend, InfluxConfig, TelemetryError, TelemetryPoint, TelemetryWriteError,
    TimeSeriesBackend,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Serve exactly one request with `status` and `body`, returning the raw
/// request text from the join handle.
async fn serve_once(status: &'static str, body: &'static str) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let task = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
        request
    });

    (addr, task)
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&data);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if data.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8(data).unwrap()
}

fn backend_for(addr: SocketAddr) -> InfluxBackend {
    InfluxBackend::new(InfluxConfig {
        url: format!("http://{addr}/"),
        org: "metro_org".to_string(),
        bucket: "metro_system".to_string(),
        token: "test-token".to_string(),
        request_timeout_ms: 1_000,
    })
    .unwrap()
}

fn access_point(user: &str, granted: bool) -> TelemetryPoint {
    TelemetryPoint::builder("metro_access")
        .tag("door", "canceladora_1")
        .tag("user", user)
        .field("access_granted", granted)
        .timestamp(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_write_sends_line_protocol() {
    let (addr, server) = serve_once("204 No Content", "").await;
    let backend = backend_for(addr);

    backend
        .write(&[access_point("card-42", true), access_point("card-999", false)])
        .await
        .unwrap();

    let request = server.await.unwrap();
    let (head, body) = request.split_once("\r\n\r\n").unwrap();

    assert!(head.starts_with("POST /api/v2/write?org=metro_org&bucket=metro_system&precision=ns HTTP/1.1"));
    assert!(head.to_ascii_lowercase().contains("authorization: token test-token"));
    assert_eq!(
        body,
        "metro_access,door=canceladora_1,user=card-42 access_granted=true 1700000000000000000\n\
         metro_access,door=canceladora_1,user=card-999 access_granted=false 1700000000000000000"
    );
}

#[tokio::test]
async fn test_write_rejected_status() {
    let (addr, server) = serve_once("400 Bad Request", "unable to parse").await;
    let backend = backend_for(addr);

    let result = backend.write(&[access_point("card-42", true)]).await;
    assert_eq!(
        result,
        Err(TelemetryWriteError::rejected(400, "unable to parse"))
    );
    assert!(!result.unwrap_err().is_retryable());
    server.await.unwrap();
}

#[tokio::test]
async fn test_write_unreachable() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = backend_for(addr);
    let result = backend.write(&[access_point("card-42", true)]).await;
    assert!(matches!(
        result,
        Err(TelemetryWriteError::BackendUnreachable { .. })
    ));
}

#[tokio::test]
async fn test_write_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Accept and never answer.
    let _server = tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let backend = InfluxBackend::new(InfluxConfig {
        url: format!("http://{addr}"),
        request_timeout_ms: 100,
        ..InfluxConfig::default()
    })
    .unwrap();

    let result = backend.write(&[access_point("card-42", true)]).await;
    assert_eq!(result, Err(TelemetryWriteError::Timeout { duration_ms: 100 }));
}

#[tokio::test]
async fn test_ping_health() {
    let (addr, server) = serve_once("200 OK", "{\"status\":\"pass\"}").await;
    let backend = backend_for(addr);

    backend.ping().await.unwrap();

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /health HTTP/1.1"));
}

#[tokio::test]
async fn test_query_access_parses_csv() {
    const CSV: &str = "#datatype,string,long,dateTime:RFC3339,boolean,string,string,string,string\r\n\
,result,table,_time,_value,_field,_measurement,door,user\r\n\
,,0,2025-11-20T10:00:05Z,true,access_granted,metro_access,canceladora_1,card-42\r\n\
,,0,2025-11-20T10:00:01Z,false,access_granted,metro_access,canceladora_1,card-999\r\n\
\r\n";

    let (addr, server) = serve_once("200 OK", CSV).await;
    let backend = backend_for(addr);
    let since = Utc.with_ymd_and_hms(2025, 11, 20, 9, 0, 0).unwrap();

    let records = backend.query_access(since, Some(100)).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].user, "card-42");
    assert!(records[0].granted);
    assert!(!records[1].granted);

    let request = server.await.unwrap();
    let lower = request.to_ascii_lowercase();
    assert!(request.starts_with("POST /api/v2/query?org=metro_org HTTP/1.1"));
    assert!(lower.contains("content-type: application/vnd.flux"));
    assert!(lower.contains("accept: application/csv"));
    assert!(request.contains("range(start: 2025-11-20T09:00:00Z)"));
}

#[tokio::test]
async fn test_query_failure_status() {
    let (addr, server) = serve_once("401 Unauthorized", "unauthorized access").await;
    let backend = backend_for(addr);

    let result = backend.query_access(Utc::now(), None).await;
    assert!(matches!(
        result,
        Err(TelemetryError::QueryFailed { status: 401, .. })
    ));
    server.await.unwrap();
}
