// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! In-memory fakes of the host collaborators, for tests.

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use crate::bpf::{BpfError, BusyPollConfigurator, XskMapLoader};
use crate::handler::{NetError, NetHandler};
use async_trait::async_trait;
use hardware::pci::address::PciAddress;
use net::eth::mac::Mac;
use net::interface::InterfaceName;
use std::collections::BTreeSet;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};
use std::sync::Mutex;

/// A host device known to a [`FakeNetHandler`]
#[derive(Clone, Debug)]
pub struct FakeDevice {
    pub name: String,
    pub driver: Option<String>,
    pub pci: Option<PciAddress>,
    pub mac: Mac,
    pub addressed: bool,
    pub subfunctions: u32,
}

impl FakeDevice {
    /// A PCI backed device bound to `driver` with `subfunctions` free CDQ slots
    pub fn new(name: &str, driver: &str, pci: &str, subfunctions: u32) -> Self {
        let pci: PciAddress = pci.parse().unwrap();
        Self {
            name: name.to_owned(),
            driver: Some(driver.to_owned()),
            pci: Some(pci),
            mac: Mac([0x02, 0, 0, pci.bus(), pci.device(), pci.function()]),
            addressed: false,
            subfunctions,
        }
    }

    /// A device without backing hardware, such as a loopback or bridge
    pub fn virtual_device(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            driver: None,
            pci: None,
            mac: Mac::ZERO,
            addressed: false,
            subfunctions: 0,
        }
    }

    #[must_use]
    pub fn with_addresses(mut self) -> Self {
        self.addressed = true;
        self
    }
}

#[derive(Default)]
struct FakeHost {
    devices: Vec<FakeDevice>,
    created: Vec<(String, u32)>,
    cycled: Vec<String>,
    failing_cycles: BTreeSet<String>,
    failing_subfunctions: bool,
}

impl FakeHost {
    fn device(&self, name: &str) -> Option<&FakeDevice> {
        self.devices.iter().find(|d| d.name == name)
    }
}

fn not_found(op: &'static str, target: impl ToString) -> NetError {
    NetError::host(op, target, io::Error::from(io::ErrorKind::NotFound))
}

/// A [`NetHandler`] backed by a list of [`FakeDevice`]s.
///
/// Creating a subfunction adds a netdev named after its primary, the way the
/// kernel driver would.
#[derive(Default)]
pub struct FakeNetHandler {
    host: Mutex<FakeHost>,
}

impl FakeNetHandler {
    pub fn new(devices: Vec<FakeDevice>) -> Self {
        Self {
            host: Mutex::new(FakeHost {
                devices,
                ..FakeHost::default()
            }),
        }
    }

    /// Subfunctions created so far, as (pci address, sfnum)
    pub fn created_subfunctions(&self) -> Vec<(String, u32)> {
        self.host.lock().unwrap().created.clone()
    }

    /// Devices cycled so far, in order
    pub fn cycled(&self) -> Vec<String> {
        self.host.lock().unwrap().cycled.clone()
    }

    /// Make cycling `name` fail from now on
    pub fn fail_cycle(&self, name: &str) {
        self.host.lock().unwrap().failing_cycles.insert(name.to_owned());
    }

    /// Make subfunction creation fail from now on
    pub fn fail_subfunction_creation(&self) {
        self.host.lock().unwrap().failing_subfunctions = true;
    }

    pub fn set_mac(&self, name: &str, mac: Mac) {
        let mut host = self.host.lock().unwrap();
        if let Some(device) = host.devices.iter_mut().find(|d| d.name == name) {
            device.mac = mac;
        }
    }

    pub fn set_subfunctions(&self, name: &str, subfunctions: u32) {
        let mut host = self.host.lock().unwrap();
        if let Some(device) = host.devices.iter_mut().find(|d| d.name == name) {
            device.subfunctions = subfunctions;
        }
    }
}

#[async_trait]
impl NetHandler for FakeNetHandler {
    async fn host_devices(&self) -> Result<Vec<InterfaceName>, NetError> {
        let host = self.host.lock().unwrap();
        host.devices
            .iter()
            .map(|d| {
                InterfaceName::try_new(d.name.as_str())
                    .map_err(|e| NetError::invalid("list", &d.name, e))
            })
            .collect()
    }

    async fn device_driver(&self, name: &InterfaceName) -> Result<String, NetError> {
        let host = self.host.lock().unwrap();
        host.device(name.as_str())
            .and_then(|d| d.driver.clone())
            .ok_or_else(|| not_found("driver lookup", name))
    }

    async fn device_pci(&self, name: &InterfaceName) -> Result<PciAddress, NetError> {
        let host = self.host.lock().unwrap();
        host.device(name.as_str())
            .and_then(|d| d.pci)
            .ok_or_else(|| not_found("pci lookup", name))
    }

    async fn device_mac(&self, name: &InterfaceName) -> Result<Mac, NetError> {
        let host = self.host.lock().unwrap();
        host.device(name.as_str())
            .map(|d| d.mac)
            .ok_or_else(|| not_found("mac lookup", name))
    }

    async fn has_addresses(&self, name: &InterfaceName) -> Result<bool, NetError> {
        let host = self.host.lock().unwrap();
        host.device(name.as_str())
            .map(|d| d.addressed)
            .ok_or_else(|| not_found("address lookup", name))
    }

    async fn netdev_exists(&self, name: &InterfaceName) -> Result<bool, NetError> {
        Ok(self.host.lock().unwrap().device(name.as_str()).is_some())
    }

    async fn cycle(&self, name: &InterfaceName) -> Result<(), NetError> {
        let mut host = self.host.lock().unwrap();
        if host.failing_cycles.contains(name.as_str()) || host.device(name.as_str()).is_none() {
            return Err(NetError::host("cycle", name, io::Error::other("link refused to cycle")));
        }
        host.cycled.push(name.to_string());
        Ok(())
    }

    async fn num_available_cdq_subfunctions(&self, pci: PciAddress) -> Result<u32, NetError> {
        let host = self.host.lock().unwrap();
        host.devices
            .iter()
            .find(|d| d.pci == Some(pci))
            .map(|d| d.subfunctions)
            .ok_or_else(|| not_found("subfunction count", pci))
    }

    async fn create_cdq_subfunction(&self, pci: PciAddress, sfnum: u32) -> Result<(), NetError> {
        let mut host = self.host.lock().unwrap();
        if host.failing_subfunctions {
            return Err(NetError::host(
                "subfunction creation",
                pci,
                io::Error::other("devlink port add failed"),
            ));
        }
        let parent = host
            .devices
            .iter()
            .find(|d| d.pci == Some(pci))
            .cloned()
            .ok_or_else(|| not_found("subfunction creation", pci))?;
        let octet = u8::try_from(sfnum & 0xff).unwrap();
        host.devices.push(FakeDevice {
            name: format!("{}sf{sfnum}", parent.name),
            driver: parent.driver.clone(),
            pci: None,
            mac: Mac([0x02, 0xaa, 0, pci.bus(), pci.function(), octet]),
            addressed: false,
            subfunctions: 0,
        });
        host.created.push((pci.to_string(), sfnum));
        Ok(())
    }

    async fn delete_cdq_subfunction(&self, pci: PciAddress, sfnum: u32) -> Result<(), NetError> {
        let mut host = self.host.lock().unwrap();
        let parent = host
            .devices
            .iter()
            .find(|d| d.pci == Some(pci))
            .map(|d| d.name.clone())
            .ok_or_else(|| not_found("subfunction removal", pci))?;
        let name = format!("{parent}sf{sfnum}");
        let before = host.devices.len();
        host.devices.retain(|d| d.name != name);
        if host.devices.len() == before {
            return Err(not_found("subfunction removal", name));
        }
        host.created.retain(|(p, n)| !(*p == pci.to_string() && *n == sfnum));
        Ok(())
    }
}

/// An [`XskMapLoader`] handing out descriptors of `/dev/null`
#[derive(Default)]
pub struct FakeLoader {
    loaded: Mutex<Vec<String>>,
    failing: Mutex<BTreeSet<String>>,
}

impl FakeLoader {
    /// Interfaces a map was loaded for, in order
    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().unwrap().clone()
    }

    /// Make loading on `interface` fail from now on
    pub fn fail_on(&self, interface: &str) {
        self.failing.lock().unwrap().insert(interface.to_owned());
    }
}

impl XskMapLoader for FakeLoader {
    fn load_xsk_map(&self, interface: &InterfaceName) -> Result<OwnedFd, BpfError> {
        if self.failing.lock().unwrap().contains(interface.as_str()) {
            return Err(BpfError::Load {
                interface: interface.clone(),
                reason: "program rejected".to_owned(),
            });
        }
        let file = std::fs::File::open("/dev/null").map_err(|e| BpfError::Load {
            interface: interface.clone(),
            reason: e.to_string(),
        })?;
        self.loaded.lock().unwrap().push(interface.to_string());
        Ok(OwnedFd::from(file))
    }
}

/// A [`BusyPollConfigurator`] recording what it was asked to do
#[derive(Default)]
pub struct FakeBusyPoll {
    calls: Mutex<Vec<(i32, i32, i32)>>,
    fail: Mutex<bool>,
}

impl FakeBusyPoll {
    /// Calls so far, as (raw fd, timeout, budget)
    pub fn calls(&self) -> Vec<(i32, i32, i32)> {
        self.calls.lock().unwrap().clone()
    }

    /// Make every further call fail
    pub fn fail(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

impl BusyPollConfigurator for FakeBusyPoll {
    fn configure_busy_poll(&self, fd: BorrowedFd<'_>, timeout: i32, budget: i32) -> Result<(), BpfError> {
        if *self.fail.lock().unwrap() {
            return Err(BpfError::BusyPoll {
                option: "SO_BUSY_POLL",
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            });
        }
        self.calls
            .lock()
            .unwrap()
            .push((fd.as_raw_fd(), timeout, budget));
        Ok(())
    }
}
