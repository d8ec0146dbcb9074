// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Messages of the kubelet pod resources API (`v1`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Devices of one resource allocated to a container
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDevices {
    pub resource_name: String,
    #[serde(default)]
    pub device_ids: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResources {
    pub name: String,
    #[serde(default)]
    pub devices: Vec<ContainerDevices>,
}

impl ContainerResources {
    /// Device ids allocated to the container under `resource_name`
    pub fn device_ids<'a>(&'a self, resource_name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.devices
            .iter()
            .filter(move |d| d.resource_name == resource_name)
            .flat_map(|d| d.device_ids.iter().map(String::as_str))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodResources {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub containers: Vec<ContainerResources>,
}

/// Response to a `List` call
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPodResourcesResponse {
    #[serde(default)]
    pub pod_resources: Vec<PodResources>,
}

#[derive(Debug, thiserror::Error)]
pub enum PodResourcesError {
    #[error("pod resources unavailable: {0}")]
    Unavailable(#[from] std::io::Error),
    #[error("malformed pod resources: {0}")]
    Malformed(String),
}

/// The kubelet pod resources service
#[async_trait]
pub trait PodResourcesClient: Send + Sync {
    /// Pods of the node with the devices allocated to their containers
    async fn list(&self) -> Result<Vec<PodResources>, PodResourcesError>;
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn device_ids_by_resource() {
        let container = ContainerResources {
            name: "app".to_owned(),
            devices: vec![
                ContainerDevices {
                    resource_name: "afxdp/cdq".to_owned(),
                    device_ids: vec!["ens1f0sf1".to_owned()],
                },
                ContainerDevices {
                    resource_name: "example.com/gpu".to_owned(),
                    device_ids: vec!["gpu0".to_owned()],
                },
                ContainerDevices {
                    resource_name: "afxdp/cdq".to_owned(),
                    device_ids: vec!["ens1f0sf2".to_owned()],
                },
            ],
        };
        assert_eq!(
            container.device_ids("afxdp/cdq").collect::<Vec<_>>(),
            vec!["ens1f0sf1", "ens1f0sf2"]
        );
        assert_eq!(container.device_ids("afxdp/other").count(), 0);
    }
}
