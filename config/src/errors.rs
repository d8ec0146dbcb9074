// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read configuration file {0}: {1}")]
    Read(String, String),
    #[error("Unsupported configuration file extension: {0}")]
    UnsupportedExtension(String),
    #[error("Failed to deserialize configuration: {0}")]
    Deserialize(String),
    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Result-like type for configurations
pub type ConfigResult = Result<(), ConfigError>;
