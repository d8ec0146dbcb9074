// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! In-memory server factory, for tests.

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use crate::factory::{PendingListener, ServerFactory};
use ipc::memory::{MemoryConnector, MemoryListener};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A [`ServerFactory`] handing out in-memory listeners under made up socket paths
#[derive(Default)]
pub struct MemoryServerFactory {
    connectors: Mutex<BTreeMap<PathBuf, MemoryConnector>>,
    failing: Mutex<bool>,
}

impl MemoryServerFactory {
    /// Connector of the listener created for `host_path`
    pub fn connector(&self, host_path: impl AsRef<Path>) -> Option<MemoryConnector> {
        self.connectors
            .lock()
            .unwrap()
            .get(host_path.as_ref())
            .cloned()
    }

    /// Number of listeners created so far
    pub fn created(&self) -> usize {
        self.connectors.lock().unwrap().len()
    }

    /// Make every further creation fail
    pub fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }
}

impl ServerFactory for MemoryServerFactory {
    fn create_listener(&self, resource_name: &str, _uid: u32) -> io::Result<PendingListener> {
        if *self.failing.lock().unwrap() {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        let mut connectors = self.connectors.lock().unwrap();
        let host_path = PathBuf::from(format!(
            "/nonexistent/afxdp_dp/{}/{}.sock",
            resource_name.replace('/', "_"),
            connectors.len()
        ));
        let (listener, connector) = MemoryListener::new();
        connectors.insert(host_path.clone(), connector);
        Ok(PendingListener {
            listener: Box::new(listener),
            host_path,
        })
    }
}
