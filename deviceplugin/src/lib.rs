// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Pool manager of the AF_XDP device plugin.
//!
//! A [`PoolManager`] serves one pool: it registers the pool resource with the
//! kubelet, advertises the pool devices, and answers allocation requests by
//! preparing the devices and starting a control-plane server that hands their
//! XSK map descriptors to the pod.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod errors;
pub mod factory;
pub mod manager;
pub mod registry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use errors::{AllocateError, PoolError};
pub use factory::{PendingListener, SeqpacketServerFactory, ServerFactory};
pub use manager::{Collaborators, PoolManager};
pub use registry::{AllocationId, ServerRegistry};
