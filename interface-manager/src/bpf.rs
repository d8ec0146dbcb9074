// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! BPF related collaborators: loading the XSK redirect program and configuring busy polling.

use net::interface::InterfaceName;
use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Errors reported by the BPF collaborators
#[derive(Debug, thiserror::Error)]
pub enum BpfError {
    #[error("failed to load xsk program on {interface}: {reason}")]
    Load {
        interface: InterfaceName,
        reason: String,
    },
    #[error("failed to set {option}: {source}")]
    BusyPoll {
        option: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Loads the XSK redirect program on an interface and returns the descriptor
/// of its XSK map.  The loader itself lives outside this workspace.
pub trait XskMapLoader: Send + Sync {
    fn load_xsk_map(&self, interface: &InterfaceName) -> Result<OwnedFd, BpfError>;
}

/// Directory the XSK maps of [`PinnedXskMapLoader`] are pinned under by default
pub const DEFAULT_PIN_DIR: &str = "/sys/fs/bpf/afxdp";

const BPF_OBJ_GET: libc::c_long = 7;

/// `bpf_attr` as read by `BPF_OBJ_GET`
#[repr(C)]
struct ObjGetAttr {
    pathname: u64,
    bpf_fd: u32,
    file_flags: u32,
}

fn bpf_obj_get(path: &Path) -> io::Result<OwnedFd> {
    let pathname = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let attr = ObjGetAttr {
        pathname: pathname.as_ptr() as u64,
        bpf_fd: 0,
        file_flags: 0,
    };
    // SAFETY: `attr` and the path it points to outlive the call, and the size
    // passed is the size of `attr`.
    let ret = unsafe {
        libc::syscall(
            libc::SYS_bpf,
            BPF_OBJ_GET,
            std::ptr::from_ref(&attr),
            std::mem::size_of::<ObjGetAttr>(),
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    let fd = i32::try_from(ret).map_err(io::Error::other)?;
    // SAFETY: the kernel just returned this descriptor and nothing else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// [`XskMapLoader`] for hosts where an external loader attaches the XSK
/// redirect program and pins its map at `<pin dir>/<interface>/xsks_map`.
#[derive(Debug, Clone)]
pub struct PinnedXskMapLoader {
    dir: PathBuf,
}

impl PinnedXskMapLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn map_path(&self, interface: &InterfaceName) -> PathBuf {
        self.dir.join(interface.as_str()).join("xsks_map")
    }
}

impl Default for PinnedXskMapLoader {
    fn default() -> Self {
        Self::new(DEFAULT_PIN_DIR)
    }
}

impl XskMapLoader for PinnedXskMapLoader {
    fn load_xsk_map(&self, interface: &InterfaceName) -> Result<OwnedFd, BpfError> {
        let path = self.map_path(interface);
        let fd = bpf_obj_get(&path).map_err(|e| BpfError::Load {
            interface: interface.clone(),
            reason: format!("no xsk map pinned at {}: {e}", path.display()),
        })?;
        debug!("Opened xsk map of {interface} pinned at {}", path.display());
        Ok(fd)
    }
}

/// Configures busy polling on an AF_XDP socket received from a pod
pub trait BusyPollConfigurator: Send + Sync {
    fn configure_busy_poll(
        &self,
        fd: BorrowedFd<'_>,
        timeout: i32,
        budget: i32,
    ) -> Result<(), BpfError>;
}

/// [`BusyPollConfigurator`] setting the socket options directly
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketBusyPoll;

fn set_int_option(
    fd: BorrowedFd<'_>,
    option: libc::c_int,
    name: &'static str,
    value: libc::c_int,
) -> Result<(), BpfError> {
    #[allow(clippy::cast_possible_truncation)]
    let len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    // SAFETY: the fd is borrowed for the duration of the call and the option
    // value points to a live c_int of the advertised length.
    let ret = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            option,
            std::ptr::from_ref(&value).cast::<libc::c_void>(),
            len,
        )
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(BpfError::BusyPoll {
            option: name,
            source: io::Error::last_os_error(),
        })
    }
}

impl BusyPollConfigurator for SocketBusyPoll {
    fn configure_busy_poll(
        &self,
        fd: BorrowedFd<'_>,
        timeout: i32,
        budget: i32,
    ) -> Result<(), BpfError> {
        set_int_option(fd, libc::SO_PREFER_BUSY_POLL, "SO_PREFER_BUSY_POLL", 1)?;
        set_int_option(fd, libc::SO_BUSY_POLL, "SO_BUSY_POLL", timeout)?;
        set_int_option(fd, libc::SO_BUSY_POLL_BUDGET, "SO_BUSY_POLL_BUDGET", budget)?;
        debug!(
            "Busy poll configured on fd {}: timeout {timeout}, budget {budget}",
            fd.as_raw_fd()
        );
        Ok(())
    }
}
