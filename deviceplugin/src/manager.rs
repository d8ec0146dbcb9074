// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The manager of one device pool.

use crate::errors::{AllocateError, PoolError};
use crate::factory::{PendingListener, ServerFactory};
use crate::registry::{AllocationId, ServerRegistry};
use config::PoolConfig;
use config::constants::{DEVICES_ENV_VAR, POD_SOCKET_PATH, RESOURCE_PREFIX};
use interface_manager::bpf::{BusyPollConfigurator, XskMapLoader};
use interface_manager::device::{Device, Mode};
use interface_manager::handler::NetHandler;
use k8s_intf::deviceplugin::{
    AllocateRequest, AllocateResponse, ContainerAllocateResponse, ListAndWatchResponse, Mount,
    RegisterRequest,
};
use k8s_intf::{PodResourcesClient, Registrar};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use udsserver::{Server, ServerConfig, ServerOutcome};

/// Everything outside the pool a [`PoolManager`] works with
#[derive(Clone)]
pub struct Collaborators {
    pub net: Arc<dyn NetHandler>,
    pub loader: Arc<dyn XskMapLoader>,
    pub busy_poll: Arc<dyn BusyPollConfigurator>,
    pub pod_resources: Arc<dyn PodResourcesClient>,
    pub registrar: Arc<dyn Registrar>,
    pub servers: Arc<dyn ServerFactory>,
}

/// Bring one device into service. `Ok(false)` means the device was left out.
async fn prepare(
    device: &mut Device,
    mode: Mode,
    net: &dyn NetHandler,
) -> Result<bool, AllocateError> {
    let name = device.name().clone();
    match serde_json::to_string(&device.details()) {
        Ok(details) => debug!("Device: {details}"),
        Err(e) => debug!("Device {name}: {e}"),
    }
    if device.mode() != mode {
        error!(
            "Pool mode {mode} does not match mode {} of device {name}",
            device.mode()
        );
        return Err(AllocateError::ModeMismatch {
            name: name.to_string(),
            pool: mode,
            device: device.mode(),
        });
    }
    if mode == Mode::Cdq {
        device
            .activate_cdq_subfunction(net)
            .await
            .map_err(AllocateError::Activation)?;
    }
    match device.mac(net).await {
        Ok(mac) => debug!("Device {name} has mac {mac}"),
        Err(e) => warn!("No mac address for {name}: {e}"),
    }
    debug!("Cycling state of device {name}");
    if let Err(e) = device.cycle(net).await {
        error!("Error cycling the state of device {name}: {e}");
        return Ok(false);
    }
    Ok(true)
}

/// Serves one pool to the kubelet
pub struct PoolManager {
    pool: PoolConfig,
    with: Collaborators,
    servers: ServerRegistry,
    advertised: watch::Sender<ListAndWatchResponse>,
}

impl PoolManager {
    #[must_use]
    pub fn new(pool: PoolConfig, collaborators: Collaborators) -> Self {
        let (advertised, _) = watch::channel(ListAndWatchResponse::default());
        Self {
            pool,
            with: collaborators,
            servers: ServerRegistry::new(),
            advertised,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.pool.name
    }

    #[must_use]
    pub fn resource_name(&self) -> &str {
        &self.pool.resource_name
    }

    /// File name of the plugin socket announced to the kubelet
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{RESOURCE_PREFIX}-{}.sock", self.pool.name)
    }

    #[must_use]
    pub fn device(&self, name: &str) -> Option<&Device> {
        self.pool.devices.get(name)
    }

    /// Number of control-plane servers still tracked
    #[must_use]
    pub fn running_servers(&self) -> usize {
        self.servers.len()
    }

    /// Register the pool with the kubelet and publish its devices
    pub async fn init(&mut self) -> Result<(), PoolError> {
        let request = RegisterRequest::new(self.endpoint(), self.pool.resource_name.as_str());
        self.with
            .registrar
            .register(request)
            .await
            .map_err(|source| PoolError::Registration {
                pool: self.pool.resource_name.clone(),
                source,
            })?;
        info!("Pool {} registered with the kubelet", self.pool.resource_name);
        if !self.pool.devices.is_empty() {
            self.advertise();
        }
        Ok(())
    }

    /// Receiver of the device lists published by the pool
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ListAndWatchResponse> {
        self.advertised.subscribe()
    }

    /// The devices of the pool, all healthy
    #[must_use]
    pub fn device_list(&self) -> ListAndWatchResponse {
        ListAndWatchResponse {
            devices: self
                .pool
                .devices
                .keys()
                .map(|name| k8s_intf::deviceplugin::Device::healthy(name.as_str()))
                .collect(),
        }
    }

    /// Publish the current device list. Nobody listening is not an error.
    pub fn advertise(&self) {
        let list = self.device_list();
        debug!(
            "Pool {} advertises {} devices",
            self.pool.resource_name,
            list.devices.len()
        );
        if self.advertised.receiver_count() == 0 {
            warn!(
                "Pool {}: no watcher for the device list",
                self.pool.resource_name
            );
        }
        self.advertised.send_replace(list);
    }

    fn pending_server(&self) -> Result<(Server, PathBuf), AllocateError> {
        let PendingListener {
            listener,
            host_path,
        } = self
            .with
            .servers
            .create_listener(&self.pool.resource_name, self.pool.uid)
            .map_err(AllocateError::Server)?;
        let config = ServerConfig {
            resource_name: self.pool.resource_name.clone(),
            idle_timeout: self.pool.uds_timeout,
            pod_resources: Arc::clone(&self.with.pod_resources),
            busy_poll: Arc::clone(&self.with.busy_poll),
            cancel: self.servers.token(),
        };
        Ok((Server::new(config, listener), host_path))
    }

    /// Prepare the devices the kubelet picked for a pod.
    ///
    /// Unless the pool disables it, one control-plane server is created for
    /// the whole request; it holds the XSK map of every device and is started
    /// once all devices are ready. Any error aborts the request.
    pub async fn allocate(
        &mut self,
        request: &AllocateRequest,
    ) -> Result<AllocateResponse, AllocateError> {
        for (id, outcome) in self.servers.reap() {
            debug!(
                "Pool {}: {id} ended for pod {}",
                self.pool.name, outcome.pod_name
            );
        }
        debug!("New allocate request on pool {}", self.pool.name);

        let mut pending = if self.pool.uds_server_disable {
            None
        } else {
            Some(self.pending_server()?)
        };
        let net = Arc::clone(&self.with.net);
        let mut response = AllocateResponse::default();

        for container in &request.container_requests {
            let mut container_response = ContainerAllocateResponse::default();
            if let Some((_, host_path)) = &pending {
                container_response.mounts.push(Mount {
                    container_path: POD_SOCKET_PATH.to_owned(),
                    host_path: host_path.display().to_string(),
                    read_only: false,
                });
            }

            for name in &container.devices_ids {
                let Some(device) = self.pool.devices.get_mut(name.as_str()) else {
                    return Err(AllocateError::UnknownDevice {
                        pool: self.pool.name.clone(),
                        device: name.clone(),
                    });
                };
                if !prepare(device, self.pool.mode, net.as_ref()).await? {
                    continue;
                }

                if let Some((server, _)) = &mut pending {
                    info!("Loading xsk program on device {name}");
                    let fd = self.with.loader.load_xsk_map(device.name())?;
                    server.add_device(name.as_str(), fd);
                }
                if !self.pool.ethtool_cmds.is_empty() {
                    device.set_ethtool_filters(self.pool.ethtool_cmds.clone());
                }
            }

            let devices = container.devices_ids.join(" ");
            debug!("Container environment: {DEVICES_ENV_VAR}={devices}");
            container_response
                .envs
                .insert(DEVICES_ENV_VAR.to_owned(), devices);
            response.container_responses.push(container_response);
        }

        if let Some((server, host_path)) = pending {
            let id = self.servers.start(server, host_path);
            info!("Pool {}: started control-plane server {id}", self.pool.name);
        }
        Ok(response)
    }

    /// Stop every control-plane server of the pool
    pub async fn terminate(&mut self) -> Vec<(AllocationId, ServerOutcome)> {
        let outcomes = self.servers.terminate().await;
        info!("{} terminated", self.pool.resource_name);
        outcomes
    }
}
