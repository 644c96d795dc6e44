//! Integration tests for script bundle loading
//!
//! Tests parsing of TOML script bundles containing capture rows,
//! structured records, and the calibration payload table.

use protocol::{
    ControlSetup, ProtocolError, ScanMode, ScriptSet, TransferRecord, CALIBRATION_REGION_SIZE,
};
use std::io::Write;

const MIXED_BUNDLE: &str = r#"
calibration_payload = [0x10, 0x20, 0x30]

init = [
    [0x40, 0x0c, 0x87, 0x00, 0x8c, 0x00, 0x01, 0x00, 0x20, 0, 0, 0, 0, 0, 0, 0],
    [0xc0, 0x0c, 0x8b, 0x00, 0x8b, 0x00, 0x01, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0],
]

setup_color = [
    [0xfb, 0xc0, 0x0c, 0x8b, 0x00, 0x8b, 0x00, 0x01, 0x00, 0x02, 0, 0, 0, 0, 0, 0],
    [0xff, 0x02, 0x00, 0x40, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    { kind = "bulk_read", endpoint = 0x03, size = 0x20 },
]

setup_monochrome = []

calibration = [
    { kind = "calibration_write", endpoint = 0x02, size = 0x3000 },
    { kind = "computed_calibrate" },
    { kind = "control", request_type = 0x40, request = 0x0c, value = 0x87, index = 0x8c, payload = [0x01] },
]

scan_color = [
    { kind = "control", request_type = 0x40, request = 0x0c, value = 0x87, index = 0x8c, payload = [0x03] },
    { kind = "bulk_read", endpoint = 0x03, size = 2478 },
    { kind = "bulk_read", endpoint = 0x03, size = 2478 },
]

scan_monochrome = [
    [0xfa, 0x03, 0x00, 0xcf, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
]

finalize = [
    { kind = "control", request_type = 0x40, request = 0x0c, value = 0x87, index = 0x8c, payload = [0x00] },
]
"#;

mod parsing {
    use super::*;

    #[test]
    fn test_parse_mixed_bundle() {
        let set = ScriptSet::from_toml_str(MIXED_BUNDLE).expect("Failed to parse bundle");

        assert_eq!(set.init.len(), 2);
        assert_eq!(set.setup_color.len(), 3);
        assert!(set.setup_monochrome.is_empty());
        assert_eq!(set.calibration.len(), 3);
        assert_eq!(set.scan_color.len(), 3);
        assert_eq!(set.scan_monochrome.len(), 1);
        assert_eq!(set.finalize.len(), 1);
        assert_eq!(set.calibration_payload, vec![0x10, 0x20, 0x30]);
        assert_eq!(set.record_count(), 13);
    }

    #[test]
    fn test_capture_rows_decoded() {
        let set = ScriptSet::from_toml_str(MIXED_BUNDLE).unwrap();

        assert_eq!(
            set.init[0],
            TransferRecord::Control {
                setup: ControlSetup {
                    request_type: 0x40,
                    request: 0x0c,
                    value: 0x87,
                    index: 0x8c,
                    length: 1,
                },
                payload: vec![0x20],
            }
        );
        assert_eq!(
            set.setup_color[1],
            TransferRecord::BulkWriteZeros {
                endpoint: 2,
                size: 0x40
            }
        );
        assert_eq!(
            set.scan(ScanMode::Monochrome)[0],
            TransferRecord::BulkRead {
                endpoint: 3,
                size: 207
            }
        );
    }

    #[test]
    fn test_structured_records_decoded() {
        let set = ScriptSet::from_toml_str(MIXED_BUNDLE).unwrap();

        assert_eq!(
            set.calibration[0],
            TransferRecord::CalibrationWrite {
                endpoint: 2,
                size: CALIBRATION_REGION_SIZE as u16
            }
        );
        assert_eq!(set.calibration[1], TransferRecord::ComputedCalibrate);

        // Control length defaults to the payload length
        match &set.scan(ScanMode::Color)[0] {
            TransferRecord::Control { setup, payload } => {
                assert_eq!(setup.length, 1);
                assert_eq!(payload, &vec![0x03]);
            }
            other => panic!("Expected control record, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_script_is_an_error() {
        let result = ScriptSet::from_toml_str("init = []\n");
        assert!(matches!(result, Err(ProtocolError::Parse(_))));
    }

    #[test]
    fn test_short_capture_row_rejected() {
        let bundle = MIXED_BUNDLE.replace(
            "[0xfa, 0x03, 0x00, 0xcf, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]",
            "[0xfa, 0x03, 0x00, 0xcf]",
        );
        assert!(ScriptSet::from_toml_str(&bundle).is_err());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let bundle = MIXED_BUNDLE.replace(
            "payload = [0x00] }",
            "length = 0, payload = [0x00] }",
        );
        assert!(ScriptSet::from_toml_str(&bundle).is_err());
    }

    #[test]
    fn test_calibration_payload_too_large() {
        let payload = vec!["0"; CALIBRATION_REGION_SIZE + 1].join(", ");
        let bundle = MIXED_BUNDLE.replace(
            "calibration_payload = [0x10, 0x20, 0x30]",
            &format!("calibration_payload = [{}]", payload),
        );
        assert!(matches!(
            ScriptSet::from_toml_str(&bundle),
            Err(ProtocolError::CalibrationPayloadTooLarge { .. })
        ));
    }
}

mod loading {
    use super::*;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MIXED_BUNDLE.as_bytes()).unwrap();

        let set = ScriptSet::load(file.path()).expect("Failed to load bundle");
        assert_eq!(set.scan(ScanMode::Color).len(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ScriptSet::load(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ProtocolError::Io(_))));
    }
}
