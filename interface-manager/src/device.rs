// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The device model.

use crate::handler::{NetError, NetHandler};
use hardware::pci::address::PciAddress;
use net::eth::mac::Mac;
use net::interface::InterfaceName;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// Drivers able to provide CDQ subfunctions
pub const CDQ_DRIVERS: &[&str] = &["ice"];

/// Tell if `driver` can provide CDQ subfunctions
#[must_use]
pub fn supports_cdq(driver: &str) -> bool {
    CDQ_DRIVERS.contains(&driver)
}

/// The way a device is handed to pods.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    PartialEq,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    /// Not yet claimed by any pool
    #[default]
    Unset,
    /// The whole interface is handed to a pod
    Primary,
    /// CDQ subfunctions of the interface are handed to pods
    Cdq,
}

/// Handle of a [`Device`] inside a [`crate::directory::DeviceDirectory`]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DeviceId(pub(crate) usize);

/// What a secondary device needs to know about the primary it was carved from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimaryRef {
    pub id: DeviceId,
    pub name: InterfaceName,
    pub pci: PciAddress,
}

/// Primary devices own their secondaries; secondaries point back at their primary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceKind {
    /// A host interface. `secondaries` stays `None` until secondaries are first requested.
    Primary { secondaries: Option<Vec<DeviceId>> },
    /// CDQ subfunction number `sfnum` of `primary`
    Secondary { primary: PrimaryRef, sfnum: u32 },
}

/// Errors produced by device operations
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("device {name} is in {current} mode, which is not compatible with {requested} mode")]
    ModeConflict {
        name: InterfaceName,
        current: Mode,
        requested: Mode,
    },
    #[error("device {0} is already fully assigned")]
    AlreadyAssigned(InterfaceName),
    #[error("device {name} has driver {driver}, which does not support CDQ")]
    DriverIncompatible {
        name: InterfaceName,
        driver: String,
    },
    #[error("device {0} is not a primary device")]
    NotPrimary(InterfaceName),
    #[error("device {0} is not a secondary device")]
    NotSecondary(InterfaceName),
    #[error("device {name}: {source}")]
    Host {
        name: InterfaceName,
        #[source]
        source: NetError,
    },
}

/// A network device known to the plugin.
#[derive(Clone, Debug)]
pub struct Device {
    id: DeviceId,
    name: InterfaceName,
    driver: Option<String>,
    pci: Option<PciAddress>,
    mac: Option<Mac>,
    mode: Mode,
    fully_assigned: bool,
    ethtool_filters: Vec<String>,
    kind: DeviceKind,
}

impl Device {
    pub(crate) fn primary(id: DeviceId, name: InterfaceName) -> Self {
        Self {
            id,
            name,
            driver: None,
            pci: None,
            mac: None,
            mode: Mode::Unset,
            fully_assigned: false,
            ethtool_filters: Vec::new(),
            kind: DeviceKind::Primary { secondaries: None },
        }
    }

    pub(crate) fn secondary(
        id: DeviceId,
        name: InterfaceName,
        driver: String,
        primary: PrimaryRef,
        sfnum: u32,
    ) -> Self {
        Self {
            id,
            name,
            driver: Some(driver),
            pci: None,
            mac: None,
            mode: Mode::Cdq,
            fully_assigned: false,
            ethtool_filters: Vec::new(),
            kind: DeviceKind::Secondary { primary, sfnum },
        }
    }

    #[must_use]
    pub fn id(&self) -> DeviceId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &InterfaceName {
        &self.name
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn kind(&self) -> &DeviceKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut DeviceKind {
        &mut self.kind
    }

    #[must_use]
    pub fn is_fully_assigned(&self) -> bool {
        self.fully_assigned
    }

    #[must_use]
    pub fn is_primary(&self) -> bool {
        matches!(self.kind, DeviceKind::Primary { .. })
    }

    #[must_use]
    pub fn is_secondary(&self) -> bool {
        matches!(self.kind, DeviceKind::Secondary { .. })
    }

    /// The primary this device was carved from, if it is a secondary
    #[must_use]
    pub fn primary_ref(&self) -> Option<&PrimaryRef> {
        match &self.kind {
            DeviceKind::Secondary { primary, .. } => Some(primary),
            DeviceKind::Primary { .. } => None,
        }
    }

    #[must_use]
    pub fn ethtool_filters(&self) -> &[String] {
        &self.ethtool_filters
    }

    pub fn set_ethtool_filters(&mut self, filters: Vec<String>) {
        self.ethtool_filters = filters;
    }

    /// Mark the device as consumed.  There is no way back.
    pub fn set_fully_assigned(&mut self) {
        self.fully_assigned = true;
    }

    fn host_error(&self, source: NetError) -> DeviceError {
        DeviceError::Host {
            name: self.name.clone(),
            source,
        }
    }

    /// The driver bound to the device, looked up once and cached
    pub async fn driver(&mut self, net: &dyn NetHandler) -> Result<&str, DeviceError> {
        if self.driver.is_none() {
            let driver = net
                .device_driver(&self.name)
                .await
                .map_err(|e| self.host_error(e))?;
            self.driver = Some(driver);
        }
        Ok(self.driver.as_deref().unwrap_or_default())
    }

    /// The PCI address of the device, looked up once and cached
    pub async fn pci(&mut self, net: &dyn NetHandler) -> Result<PciAddress, DeviceError> {
        if let Some(pci) = self.pci {
            return Ok(pci);
        }
        let pci = net
            .device_pci(&self.name)
            .await
            .map_err(|e| self.host_error(e))?;
        self.pci = Some(pci);
        Ok(pci)
    }

    /// The MAC address of the device.
    ///
    /// Secondaries come and go with their subfunction, so their address is
    /// always queried again; primaries are looked up once.
    pub async fn mac(&mut self, net: &dyn NetHandler) -> Result<Mac, DeviceError> {
        if let (Some(mac), false) = (self.mac, self.is_secondary()) {
            return Ok(mac);
        }
        let mac = net
            .device_mac(&self.name)
            .await
            .map_err(|e| self.host_error(e))?;
        self.mac = Some(mac);
        Ok(mac)
    }

    /// Move the device into `requested` mode.  Entering the current mode again is allowed.
    pub(crate) fn enter_mode(&mut self, requested: Mode) -> Result<(), DeviceError> {
        if self.mode == Mode::Unset || self.mode == requested {
            self.mode = requested;
            Ok(())
        } else {
            Err(DeviceError::ModeConflict {
                name: self.name.clone(),
                current: self.mode,
                requested,
            })
        }
    }

    /// Claim the whole device for a pool.
    ///
    /// A primary device is consumed entirely the moment it is claimed, so it is
    /// marked fully assigned.  Claiming it a second time fails.
    pub fn assign_as_primary(&mut self) -> Result<(), DeviceError> {
        if self.is_secondary() {
            return Err(DeviceError::NotPrimary(self.name.clone()));
        }
        if self.mode != Mode::Unset && self.mode != Mode::Primary {
            return Err(DeviceError::ModeConflict {
                name: self.name.clone(),
                current: self.mode,
                requested: Mode::Primary,
            });
        }
        if self.fully_assigned {
            return Err(DeviceError::AlreadyAssigned(self.name.clone()));
        }
        self.mode = Mode::Primary;
        self.fully_assigned = true;
        debug!("Device {} assigned as primary", self.name);
        Ok(())
    }

    /// Materialize this secondary as a subfunction on the host.
    ///
    /// Does nothing (beyond a warning) if the netdev already exists.
    pub async fn activate_cdq_subfunction(&self, net: &dyn NetHandler) -> Result<(), DeviceError> {
        let DeviceKind::Secondary { primary, sfnum } = &self.kind else {
            return Err(DeviceError::NotSecondary(self.name.clone()));
        };
        let driver = self.driver.as_deref().unwrap_or_default();
        if !supports_cdq(driver) {
            return Err(DeviceError::DriverIncompatible {
                name: self.name.clone(),
                driver: driver.to_owned(),
            });
        }
        if self.mode != Mode::Cdq {
            return Err(DeviceError::ModeConflict {
                name: self.name.clone(),
                current: self.mode,
                requested: Mode::Cdq,
            });
        }

        let exists = net.netdev_exists(&self.name).await.unwrap_or_else(|e| {
            error!("Could not tell if subfunction {} exists: {e}", self.name);
            false
        });
        if exists {
            warn!("Subfunction {} already exists", self.name);
            return Ok(());
        }

        net.create_cdq_subfunction(primary.pci, *sfnum)
            .await
            .map_err(|e| self.host_error(e))?;
        debug!(
            "Activated subfunction {} (sfnum {sfnum}) on {} ({})",
            self.name, primary.name, primary.pci
        );
        Ok(())
    }

    /// Remove the host subfunction backing this secondary.
    ///
    /// Does nothing if the netdev is already gone. The secondary keeps its
    /// assignment and can be activated again.
    pub async fn deactivate_cdq_subfunction(&self, net: &dyn NetHandler) -> Result<(), DeviceError> {
        let DeviceKind::Secondary { primary, sfnum } = &self.kind else {
            return Err(DeviceError::NotSecondary(self.name.clone()));
        };
        if !net.netdev_exists(&self.name).await.unwrap_or(true) {
            debug!("Subfunction {} does not exist, nothing to remove", self.name);
            return Ok(());
        }
        net.delete_cdq_subfunction(primary.pci, *sfnum)
            .await
            .map_err(|e| self.host_error(e))?;
        debug!("Deactivated subfunction {} on {}", self.name, primary.name);
        Ok(())
    }

    /// Toggle the link up and then down to clear stale driver state
    pub async fn cycle(&self, net: &dyn NetHandler) -> Result<(), DeviceError> {
        net.cycle(&self.name).await.map_err(|e| self.host_error(e))
    }

    /// A serializable view of the device
    #[must_use]
    pub fn details(&self) -> DeviceDetails {
        DeviceDetails {
            name: self.name.clone(),
            mode: self.mode,
            driver: self.driver.clone(),
            pci: self.pci,
            mac: self.mac,
            primary: self.primary_ref().map(|p| p.name.clone()),
            fully_assigned: self.fully_assigned,
            ethtool_filters: self.ethtool_filters.clone(),
        }
    }
}

/// Public view of a [`Device`], used in logs and reports
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDetails {
    pub name: InterfaceName,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pci: Option<PciAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<Mac>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<InterfaceName>,
    pub fully_assigned: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub ethtool_filters: Vec<String>,
}
