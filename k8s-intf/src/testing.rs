// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! In-memory kubelet collaborators, for tests.

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use crate::deviceplugin::{RegisterRequest, Registrar, RegistrationError};
use crate::podresources::{ContainerDevices, ContainerResources, PodResources, PodResourcesClient, PodResourcesError};
use async_trait::async_trait;
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A pod with one container holding `devices` of `resource_name`
pub fn pod(name: &str, resource_name: &str, devices: &[&str]) -> PodResources {
    PodResources {
        name: name.to_owned(),
        namespace: "default".to_owned(),
        containers: vec![ContainerResources {
            name: format!("{name}-container"),
            devices: vec![ContainerDevices {
                resource_name: resource_name.to_owned(),
                device_ids: devices.iter().map(|d| (*d).to_owned()).collect(),
            }],
        }],
    }
}

/// A [`PodResourcesClient`] serving a settable snapshot
#[derive(Default)]
pub struct FakePodResources {
    pods: Mutex<Vec<PodResources>>,
    failing: Mutex<bool>,
    calls: AtomicUsize,
}

impl FakePodResources {
    pub fn new(pods: Vec<PodResources>) -> Self {
        Self {
            pods: Mutex::new(pods),
            ..Self::default()
        }
    }

    pub fn set_pods(&self, pods: Vec<PodResources>) {
        *self.pods.lock().unwrap() = pods;
    }

    /// Make every further call fail
    pub fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }

    /// Number of `list` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PodResourcesClient for FakePodResources {
    async fn list(&self) -> Result<Vec<PodResources>, PodResourcesError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if *self.failing.lock().unwrap() {
            return Err(PodResourcesError::Unavailable(io::Error::from(
                io::ErrorKind::ConnectionRefused,
            )));
        }
        Ok(self.pods.lock().unwrap().clone())
    }
}

/// A [`Registrar`] recording the registrations it receives
#[derive(Default)]
pub struct FakeRegistrar {
    requests: Mutex<Vec<RegisterRequest>>,
    reject: Mutex<bool>,
}

impl FakeRegistrar {
    pub fn requests(&self) -> Vec<RegisterRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Make every further registration fail
    pub fn reject(&self) {
        *self.reject.lock().unwrap() = true;
    }
}

#[async_trait]
impl Registrar for FakeRegistrar {
    async fn register(&self, request: RegisterRequest) -> Result<(), RegistrationError> {
        if *self.reject.lock().unwrap() {
            return Err(RegistrationError::Rejected {
                resource: request.resource_name,
                reason: "registration closed".to_owned(),
            });
        }
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}
