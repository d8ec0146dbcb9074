// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Netdev lookups through `/sys/class/net`.

use crate::pci::address::PciAddress;
use std::io;
use std::path::{Path, PathBuf};
use tracing::trace;

/// The default location of the netdev class in sysfs
pub const SYSFS_CLASS_NET: &str = "/sys/class/net";

/// A view of the netdev class directory of sysfs.
///
/// The root is configurable so that lookups can be pointed at a fake tree.
#[derive(Debug, Clone)]
pub struct SysfsNet {
    root: PathBuf,
}

impl Default for SysfsNet {
    fn default() -> Self {
        Self::new(SYSFS_CLASS_NET)
    }
}

fn link_target_name(link: &Path) -> io::Result<String> {
    let target = std::fs::read_link(link)?;
    target
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .ok_or_else(|| {
            io::Error::other(format!(
                "symlink {} points to {}, which has no usable file name",
                link.display(),
                target.display()
            ))
        })
}

impl SysfsNet {
    /// View the netdev class directory rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn netdev(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Tell if a netdev called `name` exists
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.netdev(name).exists()
    }

    /// The name of the kernel driver bound to the device behind `name`.
    ///
    /// # Errors
    ///
    /// Fails if the netdev has no backing device or the device has no driver.
    pub fn driver(&self, name: &str) -> io::Result<String> {
        let driver = link_target_name(&self.netdev(name).join("device").join("driver"))?;
        trace!("netdev {name} is bound to driver {driver}");
        Ok(driver)
    }

    /// The PCI address of the function backing `name`.
    ///
    /// # Errors
    ///
    /// Fails if the netdev is not backed by a PCI function.
    pub fn pci_address(&self, name: &str) -> io::Result<PciAddress> {
        let device = link_target_name(&self.netdev(name).join("device"))?;
        device.parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("netdev {name} is not backed by a pci function: {e}"),
            )
        })
    }

    /// The MAC address of `name`, as reported by the kernel.
    ///
    /// # Errors
    ///
    /// Fails if the attribute cannot be read.
    pub fn mac_address(&self, name: &str) -> io::Result<String> {
        let address = std::fs::read_to_string(self.netdev(name).join("address"))?;
        Ok(address.trim().to_owned())
    }
}

#[cfg(test)]
mod test {
    use super::SysfsNet;
    use std::os::unix::fs::symlink;
    use std::path::PathBuf;

    /// Build a tiny fake of /sys with one pci netdev and one virtual netdev
    fn fake_sysfs() -> PathBuf {
        let base = std::env::temp_dir().join(format!("afxdp-sysfs-{}", uuid::Uuid::new_v4()));
        let pci_dev = base.join("devices/pci0000:17/0000:18:00.0");
        let driver = base.join("bus/pci/drivers/ice");
        let net = base.join("class/net");
        std::fs::create_dir_all(&pci_dev).unwrap();
        std::fs::create_dir_all(&driver).unwrap();
        std::fs::create_dir_all(net.join("ens1f0")).unwrap();
        std::fs::create_dir_all(net.join("lo")).unwrap();
        symlink(&pci_dev, net.join("ens1f0/device")).unwrap();
        symlink(&driver, pci_dev.join("driver")).unwrap();
        std::fs::write(net.join("ens1f0/address"), "3c:fd:fe:9e:7a:01\n").unwrap();
        base
    }

    #[test]
    fn lookups_on_pci_netdev() {
        let base = fake_sysfs();
        let sysfs = SysfsNet::new(base.join("class/net"));
        assert!(sysfs.exists("ens1f0"));
        assert!(!sysfs.exists("ens1f1"));
        assert_eq!(sysfs.driver("ens1f0").unwrap(), "ice");
        assert_eq!(
            sysfs.pci_address("ens1f0").unwrap().to_string(),
            "0000:18:00.0"
        );
        assert_eq!(sysfs.mac_address("ens1f0").unwrap(), "3c:fd:fe:9e:7a:01");
        std::fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn lookups_on_virtual_netdev_fail() {
        let base = fake_sysfs();
        let sysfs = SysfsNet::new(base.join("class/net"));
        assert!(sysfs.exists("lo"));
        assert!(sysfs.driver("lo").is_err());
        assert!(sysfs.pci_address("lo").is_err());
        std::fs::remove_dir_all(base).unwrap();
    }
}
