// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use interface_manager::bpf::BpfError;
use interface_manager::device::{DeviceError, Mode};
use k8s_intf::RegistrationError;
use std::io;

/// Reasons an allocation request is refused. Nothing is handed out when one occurs.
#[derive(Debug, thiserror::Error)]
pub enum AllocateError {
    #[error("device {device} is not part of pool {pool}")]
    UnknownDevice { pool: String, device: String },
    #[error("pool mode {pool} does not match mode {device} of device {name}")]
    ModeMismatch { name: String, pool: Mode, device: Mode },
    #[error("failed to activate subfunction: {0}")]
    Activation(#[source] DeviceError),
    #[error("failed to load the xsk program: {0}")]
    XskMap(#[from] BpfError),
    #[error("failed to create control-plane socket: {0}")]
    Server(#[source] io::Error),
}

/// Reasons a pool fails to start
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("pool {pool} could not register with the kubelet: {source}")]
    Registration {
        pool: String,
        #[source]
        source: RegistrationError,
    },
}
