// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Mac address type and logic.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A [MAC Address] type.
///
/// `Mac` is a transparent wrapper around `[u8; 6]` which provides a
/// small collection of methods and type safety.  It is rendered and parsed
/// in the colon separated form used by sysfs (`aa:bb:cc:dd:ee:ff`).
///
/// [MAC Address]: https://en.wikipedia.org/wiki/MAC_address
#[must_use]
#[repr(transparent)]
#[cfg_attr(any(feature = "bolero", test), derive(bolero::TypeGenerator))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mac(pub [u8; 6]);

impl From<[u8; 6]> for Mac {
    fn from(value: [u8; 6]) -> Self {
        Mac(value)
    }
}

impl From<Mac> for [u8; 6] {
    fn from(value: Mac) -> Self {
        value.0
    }
}

impl AsRef<[u8; 6]> for Mac {
    fn as_ref(&self) -> &[u8; 6] {
        &self.0
    }
}

impl Mac {
    /// The zero `Mac`.
    pub const ZERO: Mac = Mac([0; 6]);

    /// Returns true iff the binary representation of the [`Mac`] is exclusively zeros.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self == &Mac::ZERO
    }

    /// Returns true iff the least significant bit of the first octet of the `[Mac]` is one.
    #[must_use]
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 == 0x01
    }
}

/// Errors which can occur while parsing a [`Mac`] from text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MacParseError {
    /// Not six colon separated octets
    #[error("invalid mac address '{0}': expected six colon separated octets")]
    Format(String),
    /// One of the octets is not two hex digits
    #[error("invalid mac address '{0}': octets must be two hex digits")]
    Octet(String),
}

impl FromStr for Mac {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in &mut octets {
            let part = parts
                .next()
                .ok_or_else(|| MacParseError::Format(s.to_owned()))?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(MacParseError::Octet(s.to_owned()));
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| MacParseError::Octet(s.to_owned()))?;
        }
        if parts.next().is_some() {
            return Err(MacParseError::Format(s.to_owned()));
        }
        Ok(Mac(octets))
    }
}

impl Display for Mac {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Mac {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Mac {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::{Mac, MacParseError};

    #[test]
    fn parse_sysfs_format() {
        let mac: Mac = "3c:fd:fe:9e:7a:01".parse().unwrap();
        assert_eq!(mac, Mac([0x3c, 0xfd, 0xfe, 0x9e, 0x7a, 0x01]));
        assert!(!mac.is_multicast());
        assert_eq!(mac.to_string(), "3c:fd:fe:9e:7a:01");
        let octets: &[u8; 6] = mac.as_ref();
        assert_eq!(octets, &[0x3c, 0xfd, 0xfe, 0x9e, 0x7a, 0x01]);
    }

    #[test]
    fn parse_accepts_upper_case() {
        let mac: Mac = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            "aa:bb:cc:dd:ee".parse::<Mac>(),
            Err(MacParseError::Format(_))
        ));
        assert!(matches!(
            "aa:bb:cc:dd:ee:ff:00".parse::<Mac>(),
            Err(MacParseError::Format(_))
        ));
        assert!(matches!(
            "aa:bb:cc:dd:ee:f".parse::<Mac>(),
            Err(MacParseError::Octet(_))
        ));
        assert!(matches!(
            "aa:bb:cc:dd:ee:+f".parse::<Mac>(),
            Err(MacParseError::Octet(_))
        ));
    }

    #[test]
    fn display_parse_agree() {
        bolero::check!()
            .with_type()
            .cloned()
            .for_each(|mac: Mac| {
                assert_eq!(mac.to_string().parse::<Mac>().unwrap(), mac);
            });
    }

    #[test]
    fn serde_uses_text_form() {
        let mac = Mac([0, 1, 2, 3, 4, 0xff]);
        let json = serde_json::to_string(&mac).unwrap();
        assert_eq!(json, "\"00:01:02:03:04:ff\"");
        let back: Mac = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mac);
    }
}
