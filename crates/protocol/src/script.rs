//! Transfer scripts and the script bundle
//!
//! A script is an ordered list of transfer records executed as a unit. The
//! bundle groups the seven scripts the scanner needs together with the
//! calibration payload table, and is loaded once from a TOML file.
//!
//! # Example Bundle
//! ```toml
//! calibration_payload = [0x00, 0x01, 0x02]
//!
//! init = [
//!     [0x40, 0x0c, 0x87, 0x00, 0x8c, 0x00, 0x01, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0],
//! ]
//!
//! [[scan_color]]
//! kind = "bulk_read"
//! endpoint = 0x03
//! size = 2478
//! ```

use crate::error::{ProtocolError, Result};
use crate::record::{CALIBRATION_REGION_SIZE, TransferRecord};
use crate::types::ScanMode;
use serde::Deserialize;
use std::fs;
use std::ops::Deref;
use std::path::Path;

/// An ordered, finite sequence of transfer records
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct TransferScript {
    records: Vec<TransferRecord>,
}

impl TransferScript {
    pub fn new(records: Vec<TransferRecord>) -> Self {
        Self { records }
    }

    /// Decode a script from capture rows
    pub fn from_rows<R: AsRef<[u8]>>(rows: &[R]) -> Result<Self> {
        let records = rows
            .iter()
            .map(|row| TransferRecord::from_row(row.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { records })
    }
}

impl Deref for TransferScript {
    type Target = [TransferRecord];

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

impl From<Vec<TransferRecord>> for TransferScript {
    fn from(records: Vec<TransferRecord>) -> Self {
        Self::new(records)
    }
}

/// The complete set of scripts for one scanner model
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScriptSet {
    /// Brings the scanner out of reset; mode independent
    pub init: TransferScript,
    /// Prepares a color scan
    pub setup_color: TransferScript,
    /// Prepares a monochrome scan
    pub setup_monochrome: TransferScript,
    /// Lamp and sensor calibration; mode independent
    pub calibration: TransferScript,
    /// Streams a color frame
    pub scan_color: TransferScript,
    /// Streams a monochrome frame
    pub scan_monochrome: TransferScript,
    /// Parks the carriage after a scan or on cancel
    pub finalize: TransferScript,
    /// Prefix written by every calibration-write record
    #[serde(default)]
    pub calibration_payload: Vec<u8>,
}

impl ScriptSet {
    /// Parse a bundle from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let set: ScriptSet = toml::from_str(content)?;
        set.validate()?;
        Ok(set)
    }

    /// Load a bundle from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Setup script for the given mode
    pub fn setup(&self, mode: ScanMode) -> &TransferScript {
        match mode {
            ScanMode::Color => &self.setup_color,
            ScanMode::Monochrome => &self.setup_monochrome,
        }
    }

    /// Scan script for the given mode
    pub fn scan(&self, mode: ScanMode) -> &TransferScript {
        match mode {
            ScanMode::Color => &self.scan_color,
            ScanMode::Monochrome => &self.scan_monochrome,
        }
    }

    /// Check every record and the calibration payload
    pub fn validate(&self) -> Result<()> {
        if self.calibration_payload.len() > CALIBRATION_REGION_SIZE {
            return Err(ProtocolError::CalibrationPayloadTooLarge {
                size: self.calibration_payload.len(),
                max: CALIBRATION_REGION_SIZE,
            });
        }

        for (name, script) in self.named_scripts() {
            for (index, record) in script.iter().enumerate() {
                record
                    .validate()
                    .map_err(|e| ProtocolError::InvalidRecord {
                        script: name,
                        index,
                        source: Box::new(e),
                    })?;
            }
        }

        Ok(())
    }

    /// Total number of records across all scripts
    pub fn record_count(&self) -> usize {
        self.named_scripts().iter().map(|(_, s)| s.len()).sum()
    }

    fn named_scripts(&self) -> [(&'static str, &TransferScript); 7] {
        [
            ("init", &self.init),
            ("setup_color", &self.setup_color),
            ("setup_monochrome", &self.setup_monochrome),
            ("calibration", &self.calibration),
            ("scan_color", &self.scan_color),
            ("scan_monochrome", &self.scan_monochrome),
            ("finalize", &self.finalize),
        ]
    }
}
