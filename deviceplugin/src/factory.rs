// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Creation of the listening endpoints of control-plane servers.

use config::constants::SOCKET_DIR;
use ipc::path::{create_socket_dir, grant, socket_path};
use ipc::{FdListener, SeqpacketListener};
use std::io;
use std::path::PathBuf;
use tracing::debug;

/// A listener for a server about to be started, and the host path of its socket
pub struct PendingListener {
    pub listener: Box<dyn FdListener>,
    /// Host side of the mount handed to the kubelet
    pub host_path: PathBuf,
}

/// Provides a fresh listener to every allocation
pub trait ServerFactory: Send + Sync {
    /// A listener for a server of `resource_name`, reachable by `uid`
    fn create_listener(&self, resource_name: &str, uid: u32) -> io::Result<PendingListener>;
}

/// [`ServerFactory`] listening on `SOCK_SEQPACKET` sockets under a host directory
#[derive(Clone, Debug)]
pub struct SeqpacketServerFactory {
    base: PathBuf,
}

impl SeqpacketServerFactory {
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl Default for SeqpacketServerFactory {
    fn default() -> Self {
        Self::new(SOCKET_DIR)
    }
}

impl ServerFactory for SeqpacketServerFactory {
    fn create_listener(&self, resource_name: &str, uid: u32) -> io::Result<PendingListener> {
        let host_path = socket_path(&self.base, resource_name);
        create_socket_dir(&host_path, uid)?;
        let listener = SeqpacketListener::bind(host_path.clone())?;
        grant(&host_path, uid)?;
        debug!("Control-plane socket {} created", host_path.display());
        Ok(PendingListener {
            listener: Box::new(listener),
            host_path,
        })
    }
}
