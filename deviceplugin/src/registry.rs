// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tracking of the control-plane servers started by a pool.

use futures::FutureExt;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use udsserver::{Server, ServerOutcome};

/// Identifies the server started for one allocation request
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AllocationId(u64);

impl Display for AllocationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "allocation-{}", self.0)
    }
}

struct ServerHandle {
    host_path: PathBuf,
    task: JoinHandle<ServerOutcome>,
}

/// The running servers of a pool, keyed by allocation
pub struct ServerRegistry {
    next: u64,
    cancel: CancellationToken,
    servers: BTreeMap<AllocationId, ServerHandle>,
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_socket(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed socket {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove socket {}: {e}", path.display()),
    }
}

impl ServerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: 0,
            cancel: CancellationToken::new(),
            servers: BTreeMap::new(),
        }
    }

    /// Token to build servers with; cancelled by [`ServerRegistry::terminate`]
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Spawn `server` on the current runtime and track it
    pub fn start(&mut self, server: Server, host_path: PathBuf) -> AllocationId {
        let id = AllocationId(self.next);
        self.next += 1;
        debug!(
            "Starting server {id} for {} on {}",
            server.resource_name(),
            host_path.display()
        );
        let task = tokio::spawn(server.run());
        self.servers.insert(id, ServerHandle { host_path, task });
        id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Allocations whose server is still tracked
    #[must_use]
    pub fn allocations(&self) -> Vec<AllocationId> {
        self.servers.keys().copied().collect()
    }

    /// Forget the servers that are done and collect their outcomes
    pub fn reap(&mut self) -> Vec<(AllocationId, ServerOutcome)> {
        let done: Vec<AllocationId> = self
            .servers
            .iter()
            .filter(|(_, handle)| handle.task.is_finished())
            .map(|(id, _)| *id)
            .collect();
        let mut outcomes = Vec::new();
        for id in done {
            let Some(handle) = self.servers.remove(&id) else {
                continue;
            };
            remove_socket(&handle.host_path);
            match handle.task.now_or_never() {
                Some(Ok(outcome)) => {
                    debug!("Server {id} finished in state {}", outcome.reached);
                    outcomes.push((id, outcome));
                }
                Some(Err(e)) => error!("Server {id} failed: {e}"),
                None => warn!("Server {id} reported done but has no outcome"),
            }
        }
        outcomes
    }

    /// Cancel every server, wait for them and remove their sockets
    pub async fn terminate(&mut self) -> Vec<(AllocationId, ServerOutcome)> {
        self.cancel.cancel();
        let mut outcomes = Vec::new();
        for (id, handle) in std::mem::take(&mut self.servers) {
            match handle.task.await {
                Ok(outcome) => outcomes.push((id, outcome)),
                Err(e) => error!("Server {id} failed: {e}"),
            }
            remove_socket(&handle.host_path);
        }
        info!("Stopped {} control-plane servers", outcomes.len());
        outcomes
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use interface_manager::testing::FakeBusyPoll;
    use ipc::FdChannel;
    use ipc::memory::MemoryListener;
    use k8s_intf::testing::{FakePodResources, pod};
    use std::sync::Arc;
    use udsserver::{Ending, ServerConfigBuilder, ServerError, ServerState};

    fn server(registry: &ServerRegistry) -> (Server, ipc::memory::MemoryConnector) {
        let (listener, connector) = MemoryListener::new();
        let config = ServerConfigBuilder::default()
            .resource_name("afxdp/pool1")
            .pod_resources(Arc::new(FakePodResources::new(vec![pod(
                "podA",
                "afxdp/pool1",
                &["devA"],
            )])))
            .busy_poll(Arc::new(FakeBusyPoll::default()))
            .cancel(registry.token())
            .build()
            .unwrap();
        let mut server = Server::new(config, Box::new(listener));
        let null = std::fs::File::open("/dev/null").unwrap();
        server.add_device("devA", null.into());
        (server, connector)
    }

    #[tokio::test]
    async fn finished_servers_are_reaped() {
        let mut registry = ServerRegistry::new();
        let (first, connector) = server(&registry);
        let first = registry.start(first, PathBuf::from("/nonexistent/a.sock"));
        let (second, _idle) = server(&registry);
        let second = registry.start(second, PathBuf::from("/nonexistent/b.sock"));
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);

        let mut client = connector.connect().unwrap();
        for request in ["/connect, podA", "/fin"] {
            client.send(request.as_bytes(), None).await.unwrap();
            client.recv().await.unwrap();
        }
        // the server is done once the channel closes
        client.recv().await.unwrap_err();

        let outcomes = registry.reap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].0, first);
        assert!(matches!(outcomes[0].1.result, Ok(Ending::Fin)));
        assert_eq!(registry.allocations(), vec![second]);
    }

    #[tokio::test]
    async fn terminate_cancels_everything() {
        let mut registry = ServerRegistry::new();
        let mut connectors = vec![];
        for path in ["/nonexistent/a.sock", "/nonexistent/b.sock"] {
            let (server, connector) = server(&registry);
            connectors.push(connector);
            registry.start(server, PathBuf::from(path));
        }
        let outcomes = registry.terminate().await;
        assert_eq!(outcomes.len(), 2);
        for (_, outcome) in outcomes {
            assert_eq!(outcome.reached, ServerState::Listening);
            assert!(matches!(outcome.result, Err(ServerError::Cancelled)));
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn terminate_removes_socket_files() {
        let path = std::env::temp_dir().join(format!("afxdp-{}.sock", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"").unwrap();
        let mut registry = ServerRegistry::new();
        let (server, _connector) = server(&registry);
        registry.start(server, path.clone());
        registry.terminate().await;
        assert!(!path.exists());
    }
}
