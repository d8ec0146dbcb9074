// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Host networking operations needed by the device model.

use async_trait::async_trait;
use hardware::pci::address::PciAddress;
use net::eth::mac::Mac;
use net::interface::InterfaceName;
use std::io;

/// Errors reported by a [`NetHandler`]
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("{op} failed for {target}: {source}")]
    Host {
        op: &'static str,
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("{op} returned unusable data for {target}: {reason}")]
    Invalid {
        op: &'static str,
        target: String,
        reason: String,
    },
}

impl NetError {
    pub fn host(op: &'static str, target: impl ToString, source: io::Error) -> Self {
        NetError::Host {
            op,
            target: target.to_string(),
            source,
        }
    }

    pub fn invalid(op: &'static str, target: impl ToString, reason: impl ToString) -> Self {
        NetError::Invalid {
            op,
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Access to the network devices of the host.
///
/// The kernel implementation is [`crate::kernel::KernelNetHandler`].
#[async_trait]
pub trait NetHandler: Send + Sync {
    /// Names of the network devices of the host, in the order the host enumerates them
    async fn host_devices(&self) -> Result<Vec<InterfaceName>, NetError>;

    /// Name of the kernel driver bound to `name`
    async fn device_driver(&self, name: &InterfaceName) -> Result<String, NetError>;

    /// PCI address of the function backing `name`
    async fn device_pci(&self, name: &InterfaceName) -> Result<PciAddress, NetError>;

    /// Current MAC address of `name`
    async fn device_mac(&self, name: &InterfaceName) -> Result<Mac, NetError>;

    /// Tell if `name` has IPv4 or IPv6 addresses configured
    async fn has_addresses(&self, name: &InterfaceName) -> Result<bool, NetError>;

    /// Tell if a netdev called `name` currently exists
    async fn netdev_exists(&self, name: &InterfaceName) -> Result<bool, NetError>;

    /// Set `name` administratively up and then down again
    async fn cycle(&self, name: &InterfaceName) -> Result<(), NetError>;

    /// Number of CDQ subfunctions the port at `pci` can still provide
    async fn num_available_cdq_subfunctions(&self, pci: PciAddress) -> Result<u32, NetError>;

    /// Create and activate subfunction `sfnum` on the port at `pci`
    async fn create_cdq_subfunction(&self, pci: PciAddress, sfnum: u32) -> Result<(), NetError>;

    /// Deactivate and remove subfunction `sfnum` of the port at `pci`
    async fn delete_cdq_subfunction(&self, pci: PciAddress, sfnum: u32) -> Result<(), NetError>;
}
