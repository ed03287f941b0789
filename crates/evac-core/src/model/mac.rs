use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Hardware address. Travels as an array of six byte values, renders as
/// lowercase colon-separated hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MAC address: {0}")]
pub struct ParseMacError(String);

impl FromStr for MacAddress {
    type Err = ParseMacError;

    /// Accepts colon- or dash-separated hex, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0_u8; 6];
        let mut parts = s.split([':', '-']);
        for octet in &mut octets {
            let part = parts.next().ok_or_else(|| ParseMacError(s.to_owned()))?;
            *octet = u8::from_str_radix(part, 16).map_err(|_| ParseMacError(s.to_owned()))?;
        }
        if parts.next().is_some() {
            return Err(ParseMacError(s.to_owned()));
        }
        Ok(Self(octets))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn wire_form_is_byte_array() {
        let mac = MacAddress::new([0xaa, 0xbb, 0xcc, 0x00, 0x11, 0x22]);
        assert_eq!(serde_json::to_value(mac).unwrap(), json!([170, 187, 204, 0, 17, 34]));
        let back: MacAddress = serde_json::from_value(json!([170, 187, 204, 0, 17, 34])).unwrap();
        assert_eq!(back, mac);
    }

    #[test]
    fn out_of_range_octets_are_rejected() {
        assert!(serde_json::from_value::<MacAddress>(json!([256, 0, 0, 0, 0, 0])).is_err());
        assert!(serde_json::from_value::<MacAddress>(json!([1, 2, 3])).is_err());
    }

    #[test]
    fn display_and_parse() {
        let mac: MacAddress = "AA-BB-CC-00-11-22".parse().unwrap();
        assert_eq!(mac.to_string(), "aa:bb:cc:00:11:22");
        assert!("aa:bb:cc".parse::<MacAddress>().is_err());
        assert!("aa:bb:cc:dd:ee:ff:00".parse::<MacAddress>().is_err());
    }
}
