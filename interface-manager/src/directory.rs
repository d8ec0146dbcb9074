// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The set of devices known to the plugin.

use crate::device::{Device, DeviceError, DeviceId, DeviceKind, Mode, PrimaryRef, supports_cdq};
use crate::handler::{NetError, NetHandler};
use hardware::pci::address::PciAddress;
use net::eth::mac::Mac;
use net::interface::InterfaceName;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owner of every [`Device`] of the host, primaries and the secondaries carved out of them.
///
/// Assignment state lives here and only changes while pools are being built.
/// The directory is not shared between tasks; callers hand out [`Device`]
/// snapshots once assignment is done.
pub struct DeviceDirectory {
    net: Arc<dyn NetHandler>,
    devices: Vec<Device>,
    by_name: BTreeMap<InterfaceName, DeviceId>,
    host_order: Vec<DeviceId>,
}

impl DeviceDirectory {
    /// Build a directory from the devices the host currently has.
    pub async fn discover(net: Arc<dyn NetHandler>) -> Result<Self, NetError> {
        let names = net.host_devices().await?;
        let mut directory = Self {
            net,
            devices: Vec::with_capacity(names.len()),
            by_name: BTreeMap::new(),
            host_order: Vec::with_capacity(names.len()),
        };
        for name in names {
            if directory.by_name.contains_key(&name) {
                warn!("Host reported device {name} twice, ignoring duplicate");
                continue;
            }
            let id = directory.push(|id| Device::primary(id, name));
            directory.host_order.push(id);
        }
        info!("Discovered {} host devices", directory.host_order.len());
        Ok(directory)
    }

    fn push(&mut self, build: impl FnOnce(DeviceId) -> Device) -> DeviceId {
        let id = DeviceId(self.devices.len());
        let device = build(id);
        self.by_name.insert(device.name().clone(), id);
        self.devices.push(device);
        id
    }

    /// The host collaborator devices use
    #[must_use]
    pub fn net(&self) -> &Arc<dyn NetHandler> {
        &self.net
    }

    #[must_use]
    pub fn get(&self, id: DeviceId) -> &Device {
        &self.devices[id.0]
    }

    pub fn get_mut(&mut self, id: DeviceId) -> &mut Device {
        &mut self.devices[id.0]
    }

    /// Look a device up by name
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<DeviceId> {
        self.by_name.get(name).copied()
    }

    /// Host devices, in host enumeration order
    pub fn host_devices(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.host_order.iter().copied()
    }

    /// Find the host device backed by the PCI function `pci`
    pub async fn find_by_pci(&mut self, pci: PciAddress) -> Option<DeviceId> {
        let net = Arc::clone(&self.net);
        for id in self.host_order.clone() {
            if self.devices[id.0].pci(net.as_ref()).await.ok() == Some(pci) {
                return Some(id);
            }
        }
        None
    }

    /// Find the host device with MAC address `mac`
    pub async fn find_by_mac(&mut self, mac: Mac) -> Option<DeviceId> {
        let net = Arc::clone(&self.net);
        for id in self.host_order.clone() {
            if self.devices[id.0].mac(net.as_ref()).await.ok() == Some(mac) {
                return Some(id);
            }
        }
        None
    }

    /// Driver of device `id` (cached after the first lookup)
    pub async fn driver(&mut self, id: DeviceId) -> Result<String, DeviceError> {
        let net = Arc::clone(&self.net);
        self.devices[id.0].driver(net.as_ref()).await.map(str::to_owned)
    }

    /// Tell if device `id` has IP addresses configured
    pub async fn has_addresses(&self, id: DeviceId) -> Result<bool, DeviceError> {
        let device = &self.devices[id.0];
        self.net
            .has_addresses(device.name())
            .await
            .map_err(|source| DeviceError::Host {
                name: device.name().clone(),
                source,
            })
    }

    /// Claim device `id` as a primary device.  See [`Device::assign_as_primary`].
    pub fn assign_as_primary(&mut self, id: DeviceId) -> Result<(), DeviceError> {
        self.devices[id.0].assign_as_primary()
    }

    /// Hand out up to `limit` unassigned CDQ secondaries of primary `id` (all of them if `limit` is 0).
    ///
    /// The first call puts the primary in CDQ mode and creates one secondary per
    /// subfunction slot the hardware reports.  The slot count is not queried again.
    /// Every returned secondary is marked fully assigned.
    pub async fn assign_cdq_secondaries(
        &mut self,
        id: DeviceId,
        limit: usize,
    ) -> Result<Vec<DeviceId>, DeviceError> {
        let net = Arc::clone(&self.net);
        let primary = &mut self.devices[id.0];
        if !primary.is_primary() {
            return Err(DeviceError::NotPrimary(primary.name().clone()));
        }
        let driver = primary.driver(net.as_ref()).await?.to_owned();
        if !supports_cdq(&driver) {
            return Err(DeviceError::DriverIncompatible {
                name: primary.name().clone(),
                driver,
            });
        }
        primary.enter_mode(Mode::Cdq)?;

        if matches!(primary.kind(), DeviceKind::Primary { secondaries: None }) {
            self.create_secondaries(id, driver).await?;
        }

        let DeviceKind::Primary {
            secondaries: Some(secondaries),
        } = self.devices[id.0].kind().clone()
        else {
            return Ok(Vec::new());
        };

        let mut assigned = Vec::new();
        for sf in secondaries {
            if limit > 0 && assigned.len() >= limit {
                break;
            }
            let secondary = &mut self.devices[sf.0];
            if !secondary.is_fully_assigned() {
                secondary.set_fully_assigned();
                assigned.push(sf);
            }
        }
        debug!(
            "Assigned {} secondaries of {}",
            assigned.len(),
            self.devices[id.0].name()
        );
        Ok(assigned)
    }

    async fn create_secondaries(&mut self, id: DeviceId, driver: String) -> Result<(), DeviceError> {
        let net = Arc::clone(&self.net);
        let primary = &mut self.devices[id.0];
        let pci = primary.pci(net.as_ref()).await?;
        let name = primary.name().clone();
        let slots = net
            .num_available_cdq_subfunctions(pci)
            .await
            .map_err(|source| DeviceError::Host {
                name: name.clone(),
                source,
            })?;
        info!("Device {name} ({pci}) has {slots} CDQ subfunctions available");

        let mut secondaries = Vec::new();
        for sfnum in 1..=slots {
            let sf_name = match InterfaceName::try_new(format!("{name}sf{sfnum}")) {
                Ok(sf_name) => sf_name,
                Err(e) => {
                    warn!("Cannot name subfunction {sfnum} of {name}: {e}");
                    continue;
                }
            };
            // a subfunction left over from an earlier run shows up as a host device
            if let Some(stale) = self.by_name.get(&sf_name).copied() {
                self.host_order.retain(|host| *host != stale);
            }
            let primary = PrimaryRef {
                id,
                name: name.clone(),
                pci,
            };
            let driver = driver.clone();
            secondaries.push(self.push(|sf| Device::secondary(sf, sf_name, driver, primary, sfnum)));
        }

        if let DeviceKind::Primary { secondaries: slot } = self.devices[id.0].kind_mut() {
            *slot = Some(secondaries);
        }
        Ok(())
    }

    /// Number of secondaries of `id` not yet handed out.  Zero for secondaries
    /// and for primaries whose secondaries were never requested.
    #[must_use]
    pub fn unassigned_secondaries(&self, id: DeviceId) -> usize {
        match self.devices[id.0].kind() {
            DeviceKind::Primary {
                secondaries: Some(secondaries),
            } => secondaries
                .iter()
                .filter(|sf| !self.devices[sf.0].is_fully_assigned())
                .count(),
            _ => 0,
        }
    }

    /// Copy of device `id`, detached from the directory
    #[must_use]
    pub fn snapshot(&self, id: DeviceId) -> Device {
        self.devices[id.0].clone()
    }
}
