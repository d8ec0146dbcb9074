// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Constants shared by the device plugin crates.

use std::time::Duration;

/// Prefix of the resource names pools are registered under (`afxdp/<pool>`)
pub const RESOURCE_PREFIX: &str = "afxdp";

/// Interfaces whose name starts with one of these are never discovered by driver
pub const PROHIBITED_PREFIXES: &[&str] = &["eno", "eth", "lo", "docker", "flannel", "cni"];

/// Host directory under which control-plane sockets are created
pub const SOCKET_DIR: &str = "/tmp/afxdp_dp/";

/// Path at which the control-plane socket is mounted inside the pod
pub const POD_SOCKET_PATH: &str = "/tmp/afxdp.sock";

/// Environment variable listing the devices given to a container
pub const DEVICES_ENV_VAR: &str = "AFXDP_DEVICES";

/// Directory log files are written to
pub const LOG_DIR: &str = "/var/log/afxdp-k8s-plugins/";

/// Idle timeout of control-plane servers when the pool does not set one
pub const DEFAULT_UDS_TIMEOUT: Duration = Duration::from_secs(30);

/// Configured idle timeouts must lie in this range (seconds)
pub const UDS_TIMEOUT_RANGE: std::ops::RangeInclusive<i64> = 30..=300;

/// `udsTimeout` value disabling the idle timeout
pub const UDS_TIMEOUT_DISABLED: i64 = -1;

/// Non-root pod user ids must lie in this range
pub const UID_RANGE: std::ops::RangeInclusive<u32> = 1000..=20000;

/// Limits of the `primary` field of driver selectors
pub const PRIMARY_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

/// Limits of the `secondary` field of device and driver selectors
pub const SECONDARY_RANGE: std::ops::RangeInclusive<u32> = 1..=64;

/// Length limits of pool names
pub const POOL_NAME_LEN: std::ops::RangeInclusive<usize> = 1..=20;

/// Length limits of driver names
pub const DRIVER_NAME_LEN: std::ops::RangeInclusive<usize> = 1..=20;

/// Length limits of node host names
pub const HOSTNAME_LEN: std::ops::RangeInclusive<usize> = 1..=253;
