// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Messages of the kubelet device plugin API (`v1beta1`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the device plugin API the plugin implements
pub const API_VERSION: &str = "v1beta1";

/// Sent to the kubelet registration service to announce a resource
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub version: String,
    /// File name of the plugin socket, relative to the kubelet plugin directory
    pub endpoint: String,
    pub resource_name: String,
}

impl RegisterRequest {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, resource_name: impl Into<String>) -> Self {
        Self {
            version: API_VERSION.to_owned(),
            endpoint: endpoint.into(),
            resource_name: resource_name.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Health {
    #[default]
    Healthy,
    Unhealthy,
}

/// A device as advertised to the kubelet
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(rename = "ID")]
    pub id: String,
    pub health: Health,
}

impl Device {
    #[must_use]
    pub fn healthy(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            health: Health::Healthy,
        }
    }
}

/// One update of the device list of a resource
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAndWatchResponse {
    pub devices: Vec<Device>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerAllocateRequest {
    pub devices_ids: Vec<String>,
}

/// Devices the kubelet picked for each container of a pod
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocateRequest {
    pub container_requests: Vec<ContainerAllocateRequest>,
}

/// A host path to bind mount into a container
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    pub container_path: String,
    pub host_path: String,
    pub read_only: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerAllocateResponse {
    pub envs: BTreeMap<String, String>,
    pub mounts: Vec<Mount>,
}

/// What the kubelet must inject into each container, in request order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocateResponse {
    pub container_responses: Vec<ContainerAllocateResponse>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("kubelet rejected registration of {resource}: {reason}")]
    Rejected { resource: String, reason: String },
    #[error("kubelet unreachable: {0}")]
    Unreachable(#[from] std::io::Error),
}

/// The kubelet registration service
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(&self, request: RegisterRequest) -> Result<(), RegistrationError>;
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wire_names() {
        let update = ListAndWatchResponse {
            devices: vec![Device::healthy("ens1f0sf1")],
        };
        assert_eq!(
            serde_json::to_string(&update).unwrap(),
            r#"{"devices":[{"ID":"ens1f0sf1","health":"Healthy"}]}"#
        );
        let request = RegisterRequest::new("cdq.sock", "afxdp/cdq");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "version": "v1beta1",
                "endpoint": "cdq.sock",
                "resourceName": "afxdp/cdq",
            })
        );
    }
}
