// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors
//
// # Hardware lookups for AF_XDP devices

//! The `hardware` crate answers the questions the device plugin asks about the
//! network devices of a host:
//!
//! - which PCI function backs a netdev and which kernel driver is bound to it
//!   (through `/sys/class/net`),
//! - how many CDQ subfunctions a physical port can still provide, and how to
//!   create or remove them (through the `devlink` tool).
//!
//! ## Features
//!
//! - `sysfs`: Enables the sysfs and devlink helpers (linux-only).
//! - `serde`: Adds serialization support for [`pci::address::PciAddress`].
//! - `bolero`: Enables fuzzing support for testing.

#![deny(clippy::pedantic, clippy::unwrap_used)]

pub mod pci;

#[cfg(feature = "sysfs")]
pub mod devlink;
#[cfg(feature = "sysfs")]
pub mod sysfs;
