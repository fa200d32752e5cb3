//! Integration tests for configuration loading

use metrogate_cli::Config;
use metrogate_cli::config::BackendKind;
use metrogate_core::Role;
use metrogate_engine::registry::CredentialRegistry;
use metrogate_engine::{GateMode, SessionPolicy};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[engine]
door_id = "linea2_norte"
capacity = 120

[gate]
mode = "session_required"
cooldown_ms = 1500

[door]
actuator_timeout_ms = 3000
max_open_wait_secs = 20
stall_hold_secs = 8

[crossing]
dwell_window_ms = 4000
partial_timeout_ms = 1000

[session]
policy = "idle_timeout"
timeout_secs = 600

[loops]
sensor_tick_ms = 20
status_interval_ms = 5000

[telemetry]
backend = "mock"

[telemetry.influx]
url = "http://influx.local:8086"
org = "metro"
bucket = "linea2"
token = "secret"

[pipeline]
buffer_capacity = 2000
batch_size = 100

[[credentials]]
id = "operador"
display_name = "Operador Turno"
role = "admin"
password = "s3cret-pass"

[[credentials]]
id = "card-42"
display_name = "Card 42"
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    let engine = config.engine_config();

    assert_eq!(engine.door_id, "linea2_norte");
    assert_eq!(engine.capacity, 120);
    assert_eq!(engine.gate.mode, GateMode::SessionRequired);
    assert_eq!(engine.gate.cooldown, Duration::from_millis(1500));
    assert_eq!(engine.door.actuator_timeout, Duration::from_secs(3));
    assert_eq!(engine.crossing.dwell_window, Duration::from_secs(4));
    assert_eq!(engine.session.policy, SessionPolicy::IdleTimeout);
    assert_eq!(engine.session.timeout, Duration::from_secs(600));
    assert_eq!(config.loop_config().tick, Duration::from_millis(20));
    assert_eq!(config.status_interval(), Duration::from_secs(5));

    assert_eq!(config.telemetry.backend, BackendKind::Mock);
    assert_eq!(config.telemetry.influx.bucket, "linea2");
    assert_eq!(config.pipeline_config().batch_size, 100);

    let registry = CredentialRegistry::from_seeds(config.credentials).unwrap();
    assert_eq!(registry.len(), 2);
    let operator = registry.get(&"operador".parse().unwrap()).unwrap();
    assert_eq!(operator.role, Role::Admin);
    assert!(operator.verify_password("s3cret-pass"));
    let card = registry.get(&"card-42".parse().unwrap()).unwrap();
    assert!(!card.has_password());
    assert!(card.enabled);
}

#[test]
fn test_load_missing_file_falls_back() {
    let config = Config::load(std::path::Path::new("/nonexistent/metrogate.toml")).unwrap();
    assert_eq!(config.engine.door_id, "canceladora_1");
    assert_eq!(config.telemetry.backend, BackendKind::Influx);
    assert_eq!(config.telemetry.influx.url, "http://localhost:8086");
}

#[test]
fn test_load_invalid_file_errors() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[pipeline]\nbuffer_capacity = 0\n").unwrap();
    temp_file.flush().unwrap();

    let error = Config::load(temp_file.path()).unwrap_err();
    assert!(format!("{error:#}").contains("buffer_capacity"));
}

#[test]
fn test_shipped_dev_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/dev.toml");
    let config = Config::from_file(path).unwrap();
    assert_eq!(config.telemetry.backend, BackendKind::Mock);
    assert!(config.credentials.is_empty());
}
