// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Devices handed out by the AF_XDP device plugin.
//!
//! A [`device::Device`] is either a primary host interface or a CDQ subfunction
//! carved out of one.  The [`directory::DeviceDirectory`] owns every device the
//! plugin knows about and enforces the assignment rules: a device enters a mode
//! once, and once fully assigned it is never handed out again.  Everything the
//! devices need from the host goes through the [`handler::NetHandler`] trait.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod bpf;
pub mod device;
pub mod directory;
pub mod handler;
pub mod kernel;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
