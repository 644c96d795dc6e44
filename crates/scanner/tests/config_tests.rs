//! Integration tests for configuration files

use common::DeviceFilter;
use protocol::ScanMode;
use scanner::ScannerConfig;
use scanner::interpreter::{PollLimit, TransferTimeouts};
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

const FULL_CONFIG: &str = r#"
[scanner]
log_level = "debug"
mode = "text"
chunk_size = 8192

[usb]
device = "0x0461:*"
configuration = 1
interface = 0
alt_setting = 0

[timeouts]
control_ms = 500
bulk_read_ms = 5000
bulk_write_ms = 200

[poll]
max_attempts = 100
timeout_ms = 10000
interval_ms = 10

[scripts]
path = "/usr/share/primascan/colorado-2400u.toml"
"#;

#[test]
fn test_load_full_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scanner.toml");
    fs::write(&path, FULL_CONFIG).unwrap();

    let config = ScannerConfig::load(Some(path)).unwrap();

    assert_eq!(config.scanner.log_level, "debug");
    assert_eq!(config.scanner.mode, ScanMode::Monochrome);
    assert_eq!(config.scanner.chunk_size, 8192);
    assert_eq!(
        config.usb.device,
        DeviceFilter {
            vendor_id: Some(0x0461),
            product_id: None,
        }
    );
    assert_eq!(
        config.timeouts.to_timeouts(),
        TransferTimeouts {
            control: Duration::from_millis(500),
            bulk_read: Duration::from_millis(5000),
            bulk_write: Duration::from_millis(200),
        }
    );
    assert_eq!(
        config.poll.to_limit(),
        PollLimit {
            max_attempts: 100,
            timeout: Duration::from_secs(10),
            interval: Duration::from_millis(10),
        }
    );
    assert_eq!(
        config.scripts.resolved_path(),
        std::path::PathBuf::from("/usr/share/primascan/colorado-2400u.toml")
    );
}

#[test]
fn test_load_empty_config_gives_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scanner.toml");
    fs::write(&path, "").unwrap();

    let config = ScannerConfig::load(Some(path)).unwrap();
    assert_eq!(config, ScannerConfig::default());
}

#[test]
fn test_load_rejects_invalid_values() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scanner.toml");

    fs::write(&path, "[scanner]\nlog_level = \"loud\"\n").unwrap();
    assert!(ScannerConfig::load(Some(path.clone())).is_err());

    fs::write(&path, "[poll]\ntimeout_ms = 0\n").unwrap();
    assert!(ScannerConfig::load(Some(path.clone())).is_err());

    fs::write(&path, "[scanner]\nmode = \"sepia\"\n").unwrap();
    assert!(ScannerConfig::load(Some(path)).is_err());
}

#[test]
fn test_load_missing_file_fails() {
    let dir = tempdir().unwrap();
    assert!(ScannerConfig::load(Some(dir.path().join("absent.toml"))).is_err());
}

#[test]
fn test_save_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("scanner.toml");

    let mut config = ScannerConfig::default();
    config.scanner.mode = ScanMode::Monochrome;
    config.poll.max_attempts = 42;
    config.scripts.path = Some("~/bundle.toml".to_string());
    config.save(&path).unwrap();

    let reloaded = ScannerConfig::load(Some(path)).unwrap();
    assert_eq!(reloaded, config);
}
