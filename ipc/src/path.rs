// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Placement and ownership of control-plane socket files.

use std::fs;
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt, chown};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A fresh socket path for `resource_name` under `base`:
/// `<base>/<resource_name with '/' replaced by '_'>/<random>.sock`
#[must_use]
pub fn socket_path(base: &Path, resource_name: &str) -> PathBuf {
    base.join(resource_name.replace('/', "_"))
        .join(format!("{}.sock", uuid::Uuid::new_v4()))
}

/// Create the directory holding `socket` (mode 0700), handing it to `uid` unless it is root.
pub fn create_socket_dir(socket: &Path, uid: u32) -> io::Result<()> {
    let Some(dir) = socket.parent() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", socket.display()),
        ));
    };
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)?;
    if uid != 0 {
        chown(dir, Some(uid), None)?;
    }
    Ok(())
}

/// Make the socket file usable by `uid` only (or root, when `uid` is 0)
pub fn grant(socket: &Path, uid: u32) -> io::Result<()> {
    fs::set_permissions(socket, fs::Permissions::from_mode(0o700))?;
    if uid != 0 {
        chown(socket, Some(uid), None)?;
        debug!("Socket {} handed to uid {uid}", socket.display());
    }
    Ok(())
}
