// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Field level validation of [`ConfigFile`]s.

use crate::constants::{
    DRIVER_NAME_LEN, HOSTNAME_LEN, POOL_NAME_LEN, PRIMARY_RANGE, SECONDARY_RANGE,
    UDS_TIMEOUT_DISABLED, UDS_TIMEOUT_RANGE, UID_RANGE,
};
use crate::errors::{ConfigError, ConfigResult};
use crate::file::{ConfigFile, DeviceSelector, DriverSelector, NodeSelector, PoolMode, PoolSpec};
use hardware::pci::address::PciAddress;
use net::eth::mac::Mac;
use net::interface::InterfaceName;
use std::collections::BTreeSet;
use std::fmt::Display;

/// Collects violations, each prefixed with the path of the offending field
#[derive(Default)]
struct Violations(Vec<String>);

impl Violations {
    fn push(&mut self, path: &str, message: impl Display) {
        self.0.push(format!("{path}: {message}"));
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_ethtool_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ' ' | ':' | '.' | '/' | '_' | '-')
}

fn is_hostname_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '.'
}

fn check_device_name(v: &mut Violations, path: &str, name: &str) {
    if !name.chars().all(is_name_char) {
        v.push(path, format!("device name '{name}' must only contain [a-zA-Z0-9_-]"));
    } else if let Err(e) = InterfaceName::try_new(name) {
        v.push(path, e);
    }
}

fn check_secondary(v: &mut Violations, path: &str, secondary: Option<u32>, mode: PoolMode) {
    let Some(secondary) = secondary else {
        return;
    };
    if mode != PoolMode::Cdq {
        v.push(path, "only valid in cdq pools");
    } else if !SECONDARY_RANGE.contains(&secondary) {
        v.push(
            path,
            format!(
                "{secondary} is out of range {}..={}",
                SECONDARY_RANGE.start(),
                SECONDARY_RANGE.end()
            ),
        );
    }
}

fn check_device(v: &mut Violations, path: &str, device: &DeviceSelector, mode: PoolMode) {
    let given = [
        device.name.is_some(),
        device.pci.is_some(),
        device.mac.is_some(),
    ]
    .into_iter()
    .filter(|given| *given)
    .count();
    if given != 1 {
        v.push(path, "exactly one of name, pci or mac must be given");
    }
    if let Some(name) = &device.name {
        check_device_name(v, &format!("{path}.name"), name);
    }
    if let Some(pci) = &device.pci
        && let Err(e) = pci.parse::<PciAddress>()
    {
        v.push(&format!("{path}.pci"), e);
    }
    if let Some(mac) = &device.mac
        && let Err(e) = mac.parse::<Mac>()
    {
        v.push(&format!("{path}.mac"), e);
    }
    check_secondary(v, &format!("{path}.secondary"), device.secondary, mode);
}

fn check_driver(v: &mut Violations, path: &str, driver: &DriverSelector, mode: PoolMode) {
    if !DRIVER_NAME_LEN.contains(&driver.name.len()) || !driver.name.chars().all(is_name_char) {
        v.push(
            &format!("{path}.name"),
            format!(
                "driver name '{}' must be {}..={} characters of [a-zA-Z0-9_-]",
                driver.name,
                DRIVER_NAME_LEN.start(),
                DRIVER_NAME_LEN.end()
            ),
        );
    }
    if let Some(primary) = driver.primary
        && !PRIMARY_RANGE.contains(&primary)
    {
        v.push(
            &format!("{path}.primary"),
            format!(
                "{primary} is out of range {}..={}",
                PRIMARY_RANGE.start(),
                PRIMARY_RANGE.end()
            ),
        );
    }
    check_secondary(v, &format!("{path}.secondary"), driver.secondary, mode);
    for (i, excluded) in driver.exclude_devices.iter().enumerate() {
        let path = format!("{path}.excludeDevices[{i}]");
        if excluded.secondary.is_some() {
            v.push(&format!("{path}.secondary"), "not valid in an exclusion");
        }
        check_device(v, &path, &DeviceSelector { secondary: None, ..excluded.clone() }, mode);
    }
}

fn check_node(v: &mut Violations, path: &str, node: &NodeSelector, mode: PoolMode) {
    if !HOSTNAME_LEN.contains(&node.hostname.len()) || !node.hostname.chars().all(is_hostname_char)
    {
        v.push(
            &format!("{path}.hostname"),
            format!("'{}' is not a valid host name", node.hostname),
        );
    }
    if node.devices.is_empty() && node.drivers.is_empty() {
        v.push(path, "must select at least one device or driver");
    }
    for (i, device) in node.devices.iter().enumerate() {
        check_device(v, &format!("{path}.devices[{i}]"), device, mode);
    }
    for (i, driver) in node.drivers.iter().enumerate() {
        check_driver(v, &format!("{path}.drivers[{i}]"), driver, mode);
    }
}

fn check_pool(v: &mut Violations, path: &str, pool: &PoolSpec) {
    if !POOL_NAME_LEN.contains(&pool.name.len()) || !pool.name.chars().all(is_name_char) {
        v.push(
            &format!("{path}.name"),
            format!(
                "pool name '{}' must be {}..={} characters of [a-zA-Z0-9_-]",
                pool.name,
                POOL_NAME_LEN.start(),
                POOL_NAME_LEN.end()
            ),
        );
    }
    if pool.devices.is_empty() && pool.drivers.is_empty() && pool.nodes.is_empty() {
        v.push(path, "must select at least one device, driver or node");
    }
    for (i, device) in pool.devices.iter().enumerate() {
        check_device(v, &format!("{path}.devices[{i}]"), device, pool.mode);
    }
    for (i, driver) in pool.drivers.iter().enumerate() {
        check_driver(v, &format!("{path}.drivers[{i}]"), driver, pool.mode);
    }
    for (i, node) in pool.nodes.iter().enumerate() {
        check_node(v, &format!("{path}.nodes[{i}]"), node, pool.mode);
    }
    if pool.uds_timeout != 0
        && pool.uds_timeout != UDS_TIMEOUT_DISABLED
        && !UDS_TIMEOUT_RANGE.contains(&pool.uds_timeout)
    {
        v.push(
            &format!("{path}.udsTimeout"),
            format!(
                "{} must be 0, {UDS_TIMEOUT_DISABLED} or in range {}..={}",
                pool.uds_timeout,
                UDS_TIMEOUT_RANGE.start(),
                UDS_TIMEOUT_RANGE.end()
            ),
        );
    }
    if pool.uid != 0 && !UID_RANGE.contains(&pool.uid) {
        v.push(
            &format!("{path}.uid"),
            format!(
                "{} must be 0 or in range {}..={}",
                pool.uid,
                UID_RANGE.start(),
                UID_RANGE.end()
            ),
        );
    }
    for (i, cmd) in pool.ethtool_cmds.iter().enumerate() {
        if cmd.is_empty() || !cmd.chars().all(is_ethtool_char) {
            v.push(
                &format!("{path}.ethtoolCmds[{i}]"),
                format!("'{cmd}' must only contain [a-zA-Z0-9 :./_-]"),
            );
        }
    }
}

fn check_log_file(v: &mut Violations, log_file: &str) {
    let valid = log_file
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| {
            !stem.is_empty() && stem.chars().all(is_name_char) && matches!(ext, "log" | "txt")
        });
    if !valid {
        v.push("logFile", format!("'{log_file}' must be a .log or .txt file name"));
    }
}

impl ConfigFile {
    /// Check every field of the configuration and report all violations at once.
    pub fn validate(&self) -> ConfigResult {
        let mut v = Violations::default();
        if let Some(log_file) = &self.log_file {
            check_log_file(&mut v, log_file);
        }
        if self.pools.is_empty() {
            v.push("pools", "at least one pool must be configured");
        }
        let mut names = BTreeSet::new();
        for (i, pool) in self.pools.iter().enumerate() {
            let path = format!("pools[{i}]");
            check_pool(&mut v, &path, pool);
            if !names.insert(pool.name.as_str()) {
                v.push(&format!("{path}.name"), format!("duplicate pool name '{}'", pool.name));
            }
        }
        if v.0.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(v.0))
        }
    }
}
