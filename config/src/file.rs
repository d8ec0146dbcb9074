// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The configuration file, as written by the operator.

use crate::errors::ConfigError;
use interface_manager::device::Mode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Log levels accepted in the configuration file
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// The equivalent `tracing` filter directive
    #[must_use]
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// How the devices of a pool are handed to pods
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PoolMode {
    /// Whole interfaces
    Primary,
    /// CDQ subfunctions of interfaces
    Cdq,
}

impl From<PoolMode> for Mode {
    fn from(value: PoolMode) -> Self {
        match value {
            PoolMode::Primary => Mode::Primary,
            PoolMode::Cdq => Mode::Cdq,
        }
    }
}

/// Selects one device by name, PCI address or MAC address
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeviceSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pci: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Maximum number of secondaries taken from this device (cdq pools only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<u32>,
}

/// Selects the devices bound to a driver
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DriverSelector {
    pub name: String,
    /// Maximum number of primary devices taken for this driver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<u32>,
    /// Maximum number of secondaries taken from each device (cdq pools only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_devices: Vec<DeviceSelector>,
    /// Skip devices with IP addresses
    #[serde(default)]
    pub exclude_addressed: bool,
}

/// Selectors applying only on the node called `hostname`
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeSelector {
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drivers: Vec<DriverSelector>,
}

/// One pool of devices, registered as the resource `afxdp/<name>`
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PoolSpec {
    pub name: String,
    pub mode: PoolMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drivers: Vec<DriverSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<NodeSelector>,
    #[serde(default)]
    pub uds_server_disable: bool,
    /// Idle timeout of control-plane servers in seconds: 0 for the default, -1 to disable
    #[serde(default)]
    pub uds_timeout: i64,
    /// User id of the pod processes; 0 for root
    #[serde(default)]
    pub uid: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ethtool_cmds: Vec<String>,
}

/// The whole configuration file
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigFile {
    pub pools: Vec<PoolSpec>,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

/// Deserialize a configuration from JSON or YAML text and validate it.
pub fn load_config_from_str(text: &str) -> Result<ConfigFile, ConfigError> {
    let config: ConfigFile =
        serde_yaml_ng::from_str(text).map_err(|e| ConfigError::Deserialize(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

fn load_config_from_json(path: &Path) -> Result<ConfigFile, ConfigError> {
    let json = fs::read_to_string(path)
        .map_err(|e| ConfigError::Read(path.display().to_string(), e.to_string()))?;
    serde_json::from_str(&json).map_err(|e| ConfigError::Deserialize(e.to_string()))
}

fn load_config_from_yaml(path: &Path) -> Result<ConfigFile, ConfigError> {
    let yaml = fs::read_to_string(path)
        .map_err(|e| ConfigError::Read(path.display().to_string(), e.to_string()))?;
    serde_yaml_ng::from_str(&yaml).map_err(|e| ConfigError::Deserialize(e.to_string()))
}

/// Read the configuration file at `path` and validate it.
/// The file must contain JSON (`.json`) or YAML (`.yaml`, `.yml`).
pub fn load_config_from_file(path: impl AsRef<Path>) -> Result<ConfigFile, ConfigError> {
    let path = path.as_ref();
    let config = match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            load_config_from_yaml(path)?
        }
        Some(ext) if ext.eq_ignore_ascii_case("json") => load_config_from_json(path)?,
        Some(ext) => return Err(ConfigError::UnsupportedExtension(ext.display().to_string())),
        None => return Err(ConfigError::UnsupportedExtension(String::new())),
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    const JSON: &str = r#"{
        "logLevel": "debug",
        "pools": [
            {
                "name": "pool1",
                "mode": "primary",
                "devices": [{"name": "ens1f0"}],
                "drivers": [{"name": "i40e", "primary": 2, "excludeDevices": [{"pci": "0000:19:00.1"}]}],
                "udsTimeout": 60,
                "uid": 1500,
                "ethtoolCmds": ["-N -device- flow-type udp4 dst-ip -ip- action"]
            },
            {
                "name": "pool2",
                "mode": "cdq",
                "nodes": [{"hostname": "worker-1", "drivers": [{"name": "ice", "secondary": 4}]}],
                "udsServerDisable": true
            }
        ]
    }"#;

    #[test]
    fn parse_json() {
        let config = load_config_from_str(JSON).unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.pools.len(), 2);
        let pool1 = &config.pools[0];
        assert_eq!(pool1.mode, PoolMode::Primary);
        assert_eq!(pool1.devices[0].name.as_deref(), Some("ens1f0"));
        assert_eq!(pool1.drivers[0].primary, Some(2));
        assert_eq!(
            pool1.drivers[0].exclude_devices[0].pci.as_deref(),
            Some("0000:19:00.1")
        );
        assert_eq!(pool1.uds_timeout, 60);
        let pool2 = &config.pools[1];
        assert_eq!(pool2.mode, PoolMode::Cdq);
        assert!(pool2.uds_server_disable);
        assert_eq!(pool2.nodes[0].drivers[0].secondary, Some(4));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = load_config_from_str(r#"{"pools": [{"name": "p", "mode": "cdq", "drivrs": []}]}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Deserialize(_)));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = load_config_from_str("pools:\n  - name: p\n    mode: shared\n").unwrap_err();
        assert!(matches!(err, ConfigError::Deserialize(_)));
    }

    #[test]
    fn load_by_extension() {
        let dir = std::env::temp_dir().join(format!("afxdp-config-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();

        let json = dir.join("config.json");
        fs::write(&json, JSON).unwrap();
        assert_eq!(load_config_from_file(&json).unwrap().pools.len(), 2);

        let yaml = dir.join("config.YML");
        fs::write(&yaml, "pools:\n  - name: p\n    mode: cdq\n    drivers:\n      - name: ice\n").unwrap();
        let config = load_config_from_file(&yaml).unwrap();
        assert_eq!(config.pools[0].drivers[0].name, "ice");

        let txt = dir.join("config.txt");
        fs::write(&txt, JSON).unwrap();
        assert_eq!(
            load_config_from_file(&txt),
            Err(ConfigError::UnsupportedExtension("txt".to_owned()))
        );
        assert!(matches!(
            load_config_from_file(dir.join("missing.json")),
            Err(ConfigError::Read(_, _))
        ));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn log_level_directives() {
        assert_eq!(LogLevel::Warning.as_directive(), "warn");
        assert_eq!(LogLevel::default().as_directive(), "info");
        assert_eq!(LogLevel::Warning.to_string(), "warning");
    }
}
