// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Assignment of host devices to the configured pools.

use crate::constants::{DEFAULT_UDS_TIMEOUT, PROHIBITED_PREFIXES, RESOURCE_PREFIX, UDS_TIMEOUT_DISABLED};
use crate::file::{ConfigFile, DeviceSelector, DriverSelector, PoolMode, PoolSpec};
use interface_manager::device::{Device, DeviceId, Mode};
use interface_manager::directory::DeviceDirectory;
use net::interface::InterfaceName;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A pool with the devices it owns, ready to be served
#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub name: String,
    /// `afxdp/<name>`
    pub resource_name: String,
    pub mode: Mode,
    pub devices: BTreeMap<InterfaceName, Device>,
    pub uds_server_disable: bool,
    /// Idle timeout of control-plane servers; `None` disables it
    pub uds_timeout: Option<Duration>,
    pub uid: u32,
    pub ethtool_cmds: Vec<String>,
}

impl PoolConfig {
    fn new(spec: &PoolSpec) -> Self {
        let uds_timeout = match spec.uds_timeout {
            0 => Some(DEFAULT_UDS_TIMEOUT),
            UDS_TIMEOUT_DISABLED => None,
            secs => Some(Duration::from_secs(secs.unsigned_abs())),
        };
        Self {
            name: spec.name.clone(),
            resource_name: format!("{RESOURCE_PREFIX}/{}", spec.name),
            mode: spec.mode.into(),
            devices: BTreeMap::new(),
            uds_server_disable: spec.uds_server_disable,
            uds_timeout,
            uid: spec.uid,
            ethtool_cmds: spec.ethtool_cmds.clone(),
        }
    }

    fn add(&mut self, device: Device) {
        debug!("Pool {} takes device {}", self.name, device.name());
        self.devices.insert(device.name().clone(), device);
    }
}

/// Device and driver selectors of a pool that apply on this node
struct Selectors<'a> {
    devices: Vec<&'a DeviceSelector>,
    drivers: Vec<&'a DriverSelector>,
}

impl<'a> Selectors<'a> {
    fn for_node(spec: &'a PoolSpec, hostname: &str) -> Self {
        let nodes = spec.nodes.iter().filter(|node| node.hostname == hostname);
        let mut devices: Vec<_> = spec.devices.iter().collect();
        let mut drivers: Vec<_> = spec.drivers.iter().collect();
        for node in nodes {
            debug!("Pool {} has selectors for node {hostname}", spec.name);
            devices.extend(node.devices.iter());
            drivers.extend(node.drivers.iter());
        }
        Self { devices, drivers }
    }
}

fn limit(value: Option<u32>) -> usize {
    value.map_or(0, |v| usize::try_from(v).unwrap_or(usize::MAX))
}

async fn resolve(directory: &mut DeviceDirectory, selector: &DeviceSelector) -> Option<DeviceId> {
    if let Some(name) = &selector.name {
        return directory.lookup(name);
    }
    if let Some(pci) = &selector.pci {
        return match pci.parse() {
            Ok(pci) => directory.find_by_pci(pci).await,
            Err(e) => {
                warn!("Ignoring device selector: {e}");
                None
            }
        };
    }
    if let Some(mac) = &selector.mac {
        return match mac.parse() {
            Ok(mac) => directory.find_by_mac(mac).await,
            Err(e) => {
                warn!("Ignoring device selector: {e}");
                None
            }
        };
    }
    None
}

fn describe(selector: &DeviceSelector) -> &str {
    selector
        .name
        .as_deref()
        .or(selector.pci.as_deref())
        .or(selector.mac.as_deref())
        .unwrap_or_default()
}

/// Claim `id` for `pool`, returning how many devices the pool gained.
async fn claim(
    directory: &mut DeviceDirectory,
    pool: &mut PoolConfig,
    id: DeviceId,
    secondaries: usize,
) -> usize {
    match pool.mode {
        Mode::Cdq => match directory.assign_cdq_secondaries(id, secondaries).await {
            Ok(assigned) => {
                for sf in &assigned {
                    pool.add(directory.snapshot(*sf));
                }
                assigned.len()
            }
            Err(e) => {
                warn!("Pool {} cannot take secondaries: {e}", pool.name);
                0
            }
        },
        Mode::Primary | Mode::Unset => match directory.assign_as_primary(id) {
            Ok(()) => {
                pool.add(directory.snapshot(id));
                1
            }
            Err(e) => {
                warn!("Pool {} cannot take device: {e}", pool.name);
                0
            }
        },
    }
}

async fn excluded(
    directory: &mut DeviceDirectory,
    selector: &DriverSelector,
) -> BTreeSet<DeviceId> {
    let mut excluded = BTreeSet::new();
    for exclusion in &selector.exclude_devices {
        match resolve(directory, exclusion).await {
            Some(id) => {
                excluded.insert(id);
            }
            None => debug!(
                "Excluded device {} of driver {} not found",
                describe(exclusion),
                selector.name
            ),
        }
    }
    excluded
}

/// Tell why host device `id` may not be taken by driver discovery, if it may not.
async fn rejection(
    directory: &mut DeviceDirectory,
    id: DeviceId,
    selector: &DriverSelector,
    mode: Mode,
) -> Option<String> {
    let device = directory.get(id);
    let name = device.name().to_string();
    if let Some(prefix) = PROHIBITED_PREFIXES.iter().find(|p| name.starts_with(*p)) {
        return Some(format!("name starts with prohibited prefix {prefix}"));
    }
    if device.mode() != Mode::Unset && device.mode() != mode {
        return Some(format!("device is in {} mode", device.mode()));
    }
    if mode == Mode::Primary && device.is_fully_assigned() {
        return Some("device is already assigned".to_owned());
    }
    match directory.driver(id).await {
        Ok(driver) if driver == selector.name => {}
        Ok(_) => return Some(format!("driver is not {}", selector.name)),
        Err(e) => return Some(e.to_string()),
    }
    if selector.exclude_addressed {
        match directory.has_addresses(id).await {
            Ok(false) => {}
            Ok(true) => return Some("device has ip addresses".to_owned()),
            Err(e) => return Some(e.to_string()),
        }
    }
    None
}

async fn discover_by_driver(
    directory: &mut DeviceDirectory,
    pool: &mut PoolConfig,
    selector: &DriverSelector,
    explicit: &BTreeSet<DeviceId>,
) {
    let excluded = excluded(directory, selector).await;
    let wanted = limit(selector.primary);
    let secondaries = limit(selector.secondary);
    let mut taken = 0;
    let host: Vec<DeviceId> = directory.host_devices().collect();
    for id in host {
        if wanted > 0 && taken >= wanted {
            break;
        }
        if explicit.contains(&id) || excluded.contains(&id) {
            continue;
        }
        if let Some(reason) = rejection(directory, id, selector, pool.mode).await {
            debug!(
                "Driver {} skips {}: {reason}",
                selector.name,
                directory.get(id).name()
            );
            continue;
        }
        if claim(directory, pool, id, secondaries).await > 0 {
            taken += 1;
        }
    }
    if taken == 0 {
        warn!("Pool {}: no device found for driver {}", pool.name, selector.name);
    }
}

/// Assign the devices of `directory` to the pools of `config`, as seen from the
/// node called `hostname`.
///
/// Explicitly listed devices of every pool are claimed before any driver
/// discovery happens; a device listed by several pools goes to the first one.
/// Devices that cannot be found or claimed are logged and skipped, so pools
/// may end up empty.
pub async fn build_pools(
    config: &ConfigFile,
    directory: &mut DeviceDirectory,
    hostname: &str,
) -> Vec<PoolConfig> {
    let selectors: Vec<Selectors> = config
        .pools
        .iter()
        .map(|spec| Selectors::for_node(spec, hostname))
        .collect();

    // explicit selectors of every pool first
    let mut explicit = BTreeSet::new();
    let mut resolved: Vec<Vec<(DeviceId, usize)>> = Vec::with_capacity(config.pools.len());
    for (spec, sel) in config.pools.iter().zip(&selectors) {
        let mut devices = Vec::new();
        for selector in &sel.devices {
            match resolve(directory, selector).await {
                Some(id) if explicit.insert(id) => devices.push((id, limit(selector.secondary))),
                Some(id) => warn!(
                    "Device {} of pool {} is already listed by an earlier pool",
                    directory.get(id).name(),
                    spec.name
                ),
                None => warn!("Device {} of pool {} not found", describe(selector), spec.name),
            }
        }
        resolved.push(devices);
    }

    let mut pools = Vec::with_capacity(config.pools.len());
    for ((spec, sel), devices) in config.pools.iter().zip(&selectors).zip(resolved) {
        let mut pool = PoolConfig::new(spec);
        for (id, secondaries) in devices {
            claim(directory, &mut pool, id, secondaries).await;
        }
        for driver in &sel.drivers {
            discover_by_driver(directory, &mut pool, driver, &explicit).await;
        }
        if pool.devices.is_empty() {
            error!("Pool {} has no devices", pool.name);
        } else {
            info!(
                "Pool {} ({} mode) has {} devices",
                pool.name,
                spec.mode,
                pool.devices.len()
            );
        }
        pools.push(pool);
    }
    pools
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::file::load_config_from_str;
    use interface_manager::testing::{FakeDevice, FakeNetHandler};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn host() -> Vec<FakeDevice> {
        vec![
            FakeDevice::virtual_device("lo"),
            FakeDevice::new("eno1", "i40e", "0000:01:00.0", 0),
            FakeDevice::new("ens2f0", "i40e", "0000:19:00.0", 0),
            FakeDevice::new("ens2f1", "i40e", "0000:19:00.1", 0).with_addresses(),
            FakeDevice::new("ens2f2", "i40e", "0000:19:00.2", 0),
            FakeDevice::new("ens1f0", "ice", "0000:18:00.0", 4),
            FakeDevice::new("ens1f1", "ice", "0000:18:00.1", 2),
        ]
    }

    async fn build(yaml: &str, hostname: &str) -> (Vec<PoolConfig>, DeviceDirectory) {
        let config = load_config_from_str(yaml).unwrap();
        let net = Arc::new(FakeNetHandler::new(host()));
        let mut directory = DeviceDirectory::discover(net).await.unwrap();
        let pools = build_pools(&config, &mut directory, hostname).await;
        (pools, directory)
    }

    fn names(pool: &PoolConfig) -> Vec<String> {
        pool.devices.keys().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn primary_pool_by_driver() {
        let (pools, _) = build(
            "pools:\n  - name: p\n    mode: primary\n    drivers: [{name: i40e}]\n",
            "node",
        )
        .await;
        assert_eq!(pools.len(), 1);
        let pool = &pools[0];
        assert_eq!(pool.resource_name, "afxdp/p");
        assert_eq!(pool.mode, Mode::Primary);
        assert_eq!(pool.uds_timeout, Some(DEFAULT_UDS_TIMEOUT));
        // eno1 has a prohibited prefix
        assert_eq!(names(pool), vec!["ens2f0", "ens2f1", "ens2f2"]);
        assert!(pool.devices.values().all(Device::is_fully_assigned));
    }

    #[tokio::test]
    async fn driver_limits_and_exclusions() {
        let (pools, _) = build(
            "
pools:
  - name: p
    mode: primary
    udsTimeout: -1
    drivers:
      - name: i40e
        primary: 1
        excludeDevices: [{name: ens2f0}]
        excludeAddressed: true
",
            "node",
        )
        .await;
        assert_eq!(names(&pools[0]), vec!["ens2f2"]);
        assert_eq!(pools[0].uds_timeout, None);
    }

    #[tokio::test]
    async fn explicit_devices_win_over_discovery() {
        let (pools, _) = build(
            "
pools:
  - name: first
    mode: primary
    drivers: [{name: i40e}]
  - name: second
    mode: primary
    udsTimeout: 120
    devices: [{pci: \"0000:19:00.2\"}, {name: ens2f0}]
  - name: third
    mode: primary
    devices: [{name: ens2f0}, {name: missing0}]
",
            "node",
        )
        .await;
        assert_eq!(names(&pools[0]), vec!["ens2f1"]);
        assert_eq!(names(&pools[1]), vec!["ens2f0", "ens2f2"]);
        assert_eq!(pools[1].uds_timeout, Some(Duration::from_secs(120)));
        assert!(pools[2].devices.is_empty());
    }

    #[tokio::test]
    async fn cdq_pools_share_primaries() {
        let (pools, directory) = build(
            "
pools:
  - name: small
    mode: cdq
    devices: [{name: ens1f0, secondary: 3}]
  - name: big
    mode: cdq
    drivers: [{name: ice, secondary: 2}]
",
            "node",
        )
        .await;
        assert_eq!(names(&pools[0]), vec!["ens1f0sf1", "ens1f0sf2", "ens1f0sf3"]);
        // ens1f0 is listed explicitly by the first pool
        assert_eq!(names(&pools[1]), vec!["ens1f1sf1", "ens1f1sf2"]);
        let ens1f0 = directory.lookup("ens1f0").unwrap();
        assert_eq!(directory.unassigned_secondaries(ens1f0), 1);
        let sf = &pools[0].devices.values().next().unwrap();
        assert!(sf.is_secondary());
        assert_eq!(sf.mode(), Mode::Cdq);
    }

    #[tokio::test]
    async fn driver_primary_limit_counts_cdq_primaries() {
        let (pools, _) = build(
            "
pools:
  - name: a
    mode: cdq
    drivers: [{name: ice, primary: 1}]
",
            "node",
        )
        .await;
        assert_eq!(
            names(&pools[0]),
            vec!["ens1f0sf1", "ens1f0sf2", "ens1f0sf3", "ens1f0sf4"]
        );
    }

    #[tokio::test]
    async fn modes_do_not_mix() {
        let (pools, _) = build(
            "
pools:
  - name: prim
    mode: primary
    devices: [{name: ens1f0}]
  - name: cdq
    mode: cdq
    drivers: [{name: ice}, {name: i40e}]
",
            "node",
        )
        .await;
        assert_eq!(names(&pools[0]), vec!["ens1f0"]);
        // ens1f0 is primary, i40e cannot do cdq
        assert_eq!(names(&pools[1]), vec!["ens1f1sf1", "ens1f1sf2"]);
    }

    #[tokio::test]
    async fn node_selectors_apply_on_matching_host() {
        let yaml = "
pools:
  - name: p
    mode: primary
    nodes:
      - hostname: worker-1
        devices: [{mac: \"02:00:00:19:00:00\"}]
";
        let (pools, _) = build(yaml, "worker-1").await;
        assert_eq!(names(&pools[0]), vec!["ens2f0"]);
        let (pools, _) = build(yaml, "worker-2").await;
        assert!(pools[0].devices.is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn empty_pools_are_built() {
        let (pools, _) = build(
            "pools:\n  - name: none\n    mode: primary\n    drivers: [{name: mlx5_core}]\n",
            "node",
        )
        .await;
        assert!(pools[0].devices.is_empty());
        assert!(logs_contain("no device found for driver mlx5_core"));
    }
}
