// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Kubelet facing types and collaborators of the AF_XDP device plugin.
//!
//! The kubelet speaks gRPC; this crate only carries Rust mirrors of the
//! messages the plugin exchanges with it (device plugin `v1beta1` and pod
//! resources `v1`) and the traits the plugin calls them through.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod deviceplugin;
pub mod podresources;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use deviceplugin::{Registrar, RegistrationError};
pub use podresources::{PodResourcesClient, PodResourcesError};
pub use utils::{FilePodResources, FileRegistrar};
