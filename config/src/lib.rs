// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration of the AF_XDP device plugin: the configuration file model, its
//! validation, and the assignment of host devices to pools.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod constants;
pub mod errors;
pub mod file;
pub mod pools;
mod validate;

pub use errors::{ConfigError, ConfigResult};
pub use file::{ConfigFile, DeviceSelector, DriverSelector, LogLevel, NodeSelector, PoolMode, PoolSpec};
pub use file::{load_config_from_file, load_config_from_str};
pub use pools::{PoolConfig, build_pools};
