// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI addresses.
//!
//! This module provides the [`PciAddress`] type for the domain, bus, device,
//! function tuple which identifies a PCI function.  The text form is the one
//! used by sysfs and devlink: `dddd:bb:dd.f` in lower case hexadecimal.
//!
//! # Examples
//!
//! ```
//! use afxdp_hardware::pci::address::PciAddress;
//!
//! let address: PciAddress = "0000:18:00.1".parse().unwrap();
//! assert_eq!(address.bus(), 0x18);
//! assert_eq!(address.function(), 1);
//! assert_eq!(address.to_string(), "0000:18:00.1");
//! ```

use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A PCI function address (domain, bus, device, function).
///
/// The device number is limited to 5 bits and the function number to 3 bits;
/// a `PciAddress` outside those ranges cannot be constructed.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PciAddress {
    domain: u16,
    bus: u8,
    device: u8,
    function: u8,
}

/// Errors which may occur when building a [`PciAddress`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPciAddress {
    /// The text is not of the form `dddd:bb:dd.f`
    #[error("invalid pci address '{0}': expected dddd:bb:dd.f")]
    Format(String),
    /// The device number does not fit in 5 bits
    #[error("invalid pci device number {0:#x}: must be below 0x20")]
    Device(u8),
    /// The function number does not fit in 3 bits
    #[error("invalid pci function number {0}: must be below 8")]
    Function(u8),
}

impl PciAddress {
    /// Build a [`PciAddress`] from its components.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPciAddress`] if `device` or `function` are out of range.
    pub fn new(domain: u16, bus: u8, device: u8, function: u8) -> Result<Self, InvalidPciAddress> {
        if device >= 0x20 {
            return Err(InvalidPciAddress::Device(device));
        }
        if function >= 8 {
            return Err(InvalidPciAddress::Function(function));
        }
        Ok(Self {
            domain,
            bus,
            device,
            function,
        })
    }

    /// The PCI domain (segment)
    #[must_use]
    pub fn domain(&self) -> u16 {
        self.domain
    }

    /// The bus number
    #[must_use]
    pub fn bus(&self) -> u8 {
        self.bus
    }

    /// The device number
    #[must_use]
    pub fn device(&self) -> u8 {
        self.device
    }

    /// The function number
    #[must_use]
    pub fn function(&self) -> u8 {
        self.function
    }
}

fn hex_field<T>(text: &str, width: usize, parse: fn(&str, u32) -> Result<T, std::num::ParseIntError>) -> Option<T> {
    if text.len() != width || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    parse(text, 16).ok()
}

impl FromStr for PciAddress {
    type Err = InvalidPciAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format = || InvalidPciAddress::Format(s.to_owned());
        let (domain, rest) = s.split_once(':').ok_or_else(format)?;
        let (bus, rest) = rest.split_once(':').ok_or_else(format)?;
        let (device, function) = rest.split_once('.').ok_or_else(format)?;
        let domain = hex_field(domain, 4, u16::from_str_radix).ok_or_else(format)?;
        let bus = hex_field(bus, 2, u8::from_str_radix).ok_or_else(format)?;
        let device = hex_field(device, 2, u8::from_str_radix).ok_or_else(format)?;
        let function = hex_field(function, 1, u8::from_str_radix).ok_or_else(format)?;
        PciAddress::new(domain, bus, device, function)
    }
}

impl TryFrom<&str> for PciAddress {
    type Error = InvalidPciAddress;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for PciAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for PciAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for PciAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use super::PciAddress;
    use bolero::{Driver, TypeGenerator};

    impl TypeGenerator for PciAddress {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            let domain = driver.produce::<u16>()?;
            let bus = driver.produce::<u8>()?;
            let device = driver.produce::<u8>()? & 0x1f;
            let function = driver.produce::<u8>()? & 0x07;
            PciAddress::new(domain, bus, device, function).ok()
        }
    }
}
