// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Network interface names.

use std::borrow::Borrow;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The name of a kernel network interface.
///
/// Linux limits interface names to `IFNAMSIZ - 1` bytes and forbids a handful
/// of characters.  An `InterfaceName` is only ever constructed from text which
/// satisfies those rules, so it is always legal to hand to netlink or sysfs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct InterfaceName(String);

/// Errors which may occur when building an [`InterfaceName`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IllegalInterfaceName {
    /// Empty names are not legal
    #[error("interface name must not be empty")]
    Empty,
    /// Name exceeds the kernel limit
    #[error("interface name '{0}' is longer than {max} bytes", max = InterfaceName::MAX_LEN)]
    TooLong(String),
    /// Name contains a character the kernel rejects
    #[error("interface name '{0}' contains illegal characters")]
    IllegalCharacters(String),
    /// `.` and `..` are reserved
    #[error("interface name '{0}' is reserved")]
    Reserved(String),
}

impl InterfaceName {
    /// Maximum length of a legal interface name (`IFNAMSIZ - 1`).
    pub const MAX_LEN: usize = 15;

    /// Validate and wrap `name`.
    ///
    /// # Errors
    ///
    /// Returns an [`IllegalInterfaceName`] if the kernel would reject `name`.
    pub fn try_new(name: impl Into<String>) -> Result<Self, IllegalInterfaceName> {
        let name = name.into();
        if name.is_empty() {
            return Err(IllegalInterfaceName::Empty);
        }
        if name.len() > Self::MAX_LEN {
            return Err(IllegalInterfaceName::TooLong(name));
        }
        if name == "." || name == ".." {
            return Err(IllegalInterfaceName::Reserved(name));
        }
        if !name
            .bytes()
            .all(|b| b.is_ascii_graphic() && b != b'/' && b != b':')
        {
            return Err(IllegalInterfaceName::IllegalCharacters(name));
        }
        Ok(Self(name))
    }

    /// The name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InterfaceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for InterfaceName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl TryFrom<&str> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl FromStr for InterfaceName {
    type Err = IllegalInterfaceName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_new(s)
    }
}

impl From<InterfaceName> for String {
    fn from(value: InterfaceName) -> Self {
        value.0
    }
}
