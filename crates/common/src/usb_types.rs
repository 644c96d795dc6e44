//! USB device filters
//!
//! A filter is written as `VID:PID` with hex ids, e.g. `0x0461:0x0346`.
//! Either side may be `*` to match any id.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Primax Colorado 2400U
pub const COLORADO_2400U: DeviceFilter = DeviceFilter {
    vendor_id: Some(0x0461),
    product_id: Some(0x0346),
};

/// VID:PID device match pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceFilter {
    /// Vendor id, `None` matches any vendor
    pub vendor_id: Option<u16>,
    /// Product id, `None` matches any product
    pub product_id: Option<u16>,
}

impl DeviceFilter {
    /// Check whether a device descriptor matches this filter
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id.is_none_or(|v| v == vendor_id)
            && self.product_id.is_none_or(|p| p == product_id)
    }

    fn parse_id(id: &str, name: &str) -> crate::Result<Option<u16>> {
        if id == "*" {
            return Ok(None);
        }

        let hex_part = id
            .strip_prefix("0x")
            .or_else(|| id.strip_prefix("0X"))
            .ok_or_else(|| {
                crate::Error::Filter(format!(
                    "Invalid {} '{}', must start with '0x' (e.g., '0x0461')",
                    name, id
                ))
            })?;

        if hex_part.is_empty() || hex_part.len() > 4 {
            return Err(crate::Error::Filter(format!(
                "Invalid {} '{}', hex part must be 1-4 digits",
                name, id
            )));
        }

        u16::from_str_radix(hex_part, 16).map(Some).map_err(|_| {
            crate::Error::Filter(format!("Invalid {} '{}', not a valid hex number", name, id))
        })
    }
}

impl Default for DeviceFilter {
    fn default() -> Self {
        COLORADO_2400U
    }
}

impl FromStr for DeviceFilter {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 2 {
            return Err(crate::Error::Filter(format!(
                "Invalid filter format '{}', expected VID:PID (e.g., '0x0461:0x0346' or '0x0461:*')",
                s
            )));
        }

        Ok(Self {
            vendor_id: Self::parse_id(parts[0], "VID")?,
            product_id: Self::parse_id(parts[1], "PID")?,
        })
    }
}

impl fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.vendor_id {
            Some(v) => write!(f, "{:#06x}", v)?,
            None => write!(f, "*")?,
        }
        write!(f, ":")?;
        match self.product_id {
            Some(p) => write!(f, "{:#06x}", p),
            None => write!(f, "*"),
        }
    }
}

impl Serialize for DeviceFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DeviceFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_filters() {
        assert_eq!(
            "0x0461:0x0346".parse::<DeviceFilter>().unwrap(),
            COLORADO_2400U
        );
        assert_eq!(
            "0X0461:*".parse::<DeviceFilter>().unwrap(),
            DeviceFilter {
                vendor_id: Some(0x0461),
                product_id: None
            }
        );
        assert!("*:*".parse::<DeviceFilter>().is_ok());
        assert!("0xABCD:0xEF01".parse::<DeviceFilter>().is_ok());
    }

    #[test]
    fn test_parse_invalid_filters() {
        assert!("0461:0346".parse::<DeviceFilter>().is_err());
        assert!("0x0461".parse::<DeviceFilter>().is_err());
        assert!("0x0461:0x0346:0x1".parse::<DeviceFilter>().is_err());
        assert!("0xGHIJ:0x0346".parse::<DeviceFilter>().is_err());
        assert!("0x12345:0x0346".parse::<DeviceFilter>().is_err());
        assert!("0x:0x0346".parse::<DeviceFilter>().is_err());
    }

    #[test]
    fn test_matches() {
        assert!(COLORADO_2400U.matches(0x0461, 0x0346));
        assert!(!COLORADO_2400U.matches(0x0461, 0x0347));
        assert!(!COLORADO_2400U.matches(0x04f9, 0x0346));

        let any_primax: DeviceFilter = "0x0461:*".parse().unwrap();
        assert!(any_primax.matches(0x0461, 0x0001));
        assert!(!any_primax.matches(0x0462, 0x0001));
    }

    #[test]
    fn test_display_round_trips() {
        assert_eq!(COLORADO_2400U.to_string(), "0x0461:0x0346");
        let wildcard: DeviceFilter = "*:0x0346".parse().unwrap();
        assert_eq!(wildcard.to_string(), "*:0x0346");
        assert_eq!(wildcard.to_string().parse::<DeviceFilter>().unwrap(), wildcard);
    }

    #[test]
    fn test_serde_as_string() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            device: DeviceFilter,
        }

        let parsed: Wrapper = toml::from_str("device = \"0x0461:0x0346\"").unwrap();
        assert_eq!(parsed.device, COLORADO_2400U);

        let written = toml::to_string(&parsed).unwrap();
        assert!(written.contains("0x0461:0x0346"));

        assert!(toml::from_str::<Wrapper>("device = \"nope\"").is_err());
    }
}
