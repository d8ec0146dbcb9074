// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! [`NetHandler`] backed by the running kernel.

use crate::handler::{NetError, NetHandler};
use async_trait::async_trait;
use futures::TryStreamExt;
use hardware::devlink::Devlink;
use hardware::pci::address::PciAddress;
use hardware::sysfs::SysfsNet;
use net::eth::mac::Mac;
use net::interface::InterfaceName;
use rtnetlink::packet_route::link::LinkFlags;
use rtnetlink::{Handle, LinkUnspec};
use std::io;
use tracing::{debug, info, warn};

/// Host access through sysfs, netlink and devlink.
#[derive(Debug, Clone, Default)]
pub struct KernelNetHandler {
    sysfs: SysfsNet,
    devlink: Devlink,
}

impl KernelNetHandler {
    #[must_use]
    pub fn new(sysfs: SysfsNet, devlink: Devlink) -> Self {
        Self { sysfs, devlink }
    }

    fn interface(name: &InterfaceName) -> Result<netdev::Interface, NetError> {
        netdev::get_interfaces()
            .into_iter()
            .find(|interface| interface.name == name.as_str())
            .ok_or_else(|| {
                NetError::host("interface lookup", name, io::Error::from(io::ErrorKind::NotFound))
            })
    }

    async fn set_link(handle: &Handle, name: &InterfaceName, up: bool) -> io::Result<()> {
        let link = handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute()
            .try_next()
            .await
            .map_err(|e| io::Error::other(format!("Failed to look up {name}: {e}")))?
            .ok_or_else(|| io::Error::other(format!("Got no response looking up {name}")))?;
        let ifindex = link.header.index;
        let request = if up {
            LinkUnspec::new_with_index(ifindex).up().build()
        } else {
            LinkUnspec::new_with_index(ifindex).down().build()
        };
        handle.link().set(request).execute().await.map_err(|e| {
            io::Error::other(format!(
                "Failed to bring {name} (ifindex {ifindex}) {}: {e}",
                if up { "up" } else { "down" }
            ))
        })?;

        let state = handle
            .link()
            .get()
            .match_index(ifindex)
            .execute()
            .try_next()
            .await
            .map_err(|e| io::Error::other(format!("Failed to verify status of {name}: {e}")))?;
        match state {
            Some(msg) if msg.header.flags.contains(LinkFlags::Up) == up => Ok(()),
            Some(msg) => {
                warn!("Interface {name} did not change state, flags: {:?}", msg.header.flags);
                Err(io::Error::other(format!("Interface {name} did not change state")))
            }
            None => Err(io::Error::other(format!(
                "Got no response to check status of interface {name}"
            ))),
        }
    }
}

#[async_trait]
impl NetHandler for KernelNetHandler {
    async fn host_devices(&self) -> Result<Vec<InterfaceName>, NetError> {
        let mut names = Vec::new();
        for interface in netdev::get_interfaces() {
            match InterfaceName::try_new(interface.name.as_str()) {
                Ok(name) => names.push(name),
                Err(e) => warn!("Ignoring host interface: {e}"),
            }
        }
        debug!("Host has {} network devices", names.len());
        Ok(names)
    }

    async fn device_driver(&self, name: &InterfaceName) -> Result<String, NetError> {
        self.sysfs
            .driver(name.as_str())
            .map_err(|e| NetError::host("driver lookup", name, e))
    }

    async fn device_pci(&self, name: &InterfaceName) -> Result<PciAddress, NetError> {
        self.sysfs
            .pci_address(name.as_str())
            .map_err(|e| NetError::host("pci lookup", name, e))
    }

    async fn device_mac(&self, name: &InterfaceName) -> Result<Mac, NetError> {
        let text = self
            .sysfs
            .mac_address(name.as_str())
            .map_err(|e| NetError::host("mac lookup", name, e))?;
        text.parse()
            .map_err(|e| NetError::invalid("mac lookup", name, e))
    }

    async fn has_addresses(&self, name: &InterfaceName) -> Result<bool, NetError> {
        let interface = Self::interface(name)?;
        Ok(!interface.ipv4.is_empty() || !interface.ipv6.is_empty())
    }

    async fn netdev_exists(&self, name: &InterfaceName) -> Result<bool, NetError> {
        Ok(self.sysfs.exists(name.as_str()))
    }

    async fn cycle(&self, name: &InterfaceName) -> Result<(), NetError> {
        let (connection, handle, _) =
            rtnetlink::new_connection().map_err(|e| NetError::host("netlink connect", name, e))?;
        tokio::spawn(connection);
        info!("Cycling interface {name}");
        Self::set_link(&handle, name, true)
            .await
            .map_err(|e| NetError::host("link up", name, e))?;
        Self::set_link(&handle, name, false)
            .await
            .map_err(|e| NetError::host("link down", name, e))
    }

    async fn num_available_cdq_subfunctions(&self, pci: PciAddress) -> Result<u32, NetError> {
        self.devlink
            .available_subfunctions(pci)
            .await
            .map_err(|e| NetError::host("subfunction count", pci, e))
    }

    async fn create_cdq_subfunction(&self, pci: PciAddress, sfnum: u32) -> Result<(), NetError> {
        let port = self
            .devlink
            .add_subfunction(pci, sfnum)
            .await
            .map_err(|e| NetError::host("subfunction creation", pci, e))?;
        debug!("Subfunction {sfnum} of {pci} is devlink port {port}");
        Ok(())
    }

    async fn delete_cdq_subfunction(&self, pci: PciAddress, sfnum: u32) -> Result<(), NetError> {
        self.devlink
            .delete_subfunction(pci, sfnum)
            .await
            .map_err(|e| NetError::host("subfunction removal", pci, e))
    }
}
