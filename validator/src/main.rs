// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A configuration validator. It reads a device plugin configuration (JSON or
//! YAML) from a file or stdin, validates it the same way the device plugin
//! does and prints the outcome as YAML on stdout. With `--discover`, the pools
//! are also resolved against the devices of this host.

#![deny(clippy::all)]

use clap::Parser;
use config::{ConfigError, ConfigFile, build_pools, load_config_from_file, load_config_from_str};
use interface_manager::device::{DeviceDetails, Mode};
use interface_manager::directory::DeviceDirectory;
use interface_manager::handler::NetHandler;
use interface_manager::kernel::KernelNetHandler;
use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Parser)]
#[command(name = "afxdp-validator")]
#[command(about = "Validate an AF_XDP device plugin configuration", long_about = None)]
struct Args {
    #[arg(
        long,
        value_name = "FILE",
        help = "Configuration file (.json, .yaml or .yml); read from stdin if absent"
    )]
    config: Option<PathBuf>,

    #[arg(long, help = "Resolve the pools against the network devices of this host")]
    discover: bool,

    #[arg(
        long,
        value_name = "NAME",
        help = "Node name used to apply node selectors; the host name if absent"
    )]
    hostname: Option<String>,

    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "warning",
        help = "debug, info, warning or error"
    )]
    log_level: String,
}

/// The type representing an error when validating a configuration
#[derive(Debug, thiserror::Error)]
enum ValidateError {
    /// Problems of the environment the tool runs in
    #[error("{0}")]
    Environment(String),

    /// The input is not a configuration at all
    #[error("{0}")]
    Deserialize(String),

    /// The configuration parsed but some of its fields are invalid
    #[error("{}", .0.join("; "))]
    Configuration(Vec<String>),

    /// The pools could not be resolved against the host
    #[error("{0}")]
    Discovery(String),
}

impl ValidateError {
    /// Provide a string indicating the type of error
    fn get_type(&self) -> &'static str {
        match self {
            ValidateError::Environment(_) => "Environment",
            ValidateError::Deserialize(_) => "Deserialization",
            ValidateError::Configuration(_) => "Configuration",
            ValidateError::Discovery(_) => "Discovery",
        }
    }

    /// One message per violation
    fn get_msg(&self) -> Vec<String> {
        match self {
            ValidateError::Environment(v)
            | ValidateError::Deserialize(v)
            | ValidateError::Discovery(v) => vec![v.clone()],
            ValidateError::Configuration(v) => v.clone(),
        }
    }
}

impl From<ConfigError> for ValidateError {
    fn from(value: ConfigError) -> Self {
        match value {
            ConfigError::Read(..) | ConfigError::UnsupportedExtension(_) => {
                ValidateError::Environment(value.to_string())
            }
            ConfigError::Deserialize(e) => ValidateError::Deserialize(e),
            ConfigError::Invalid(violations) => ValidateError::Configuration(violations),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct ValidateErrorOut {
    r#type: String,
    message: String,
}

/// A pool as it would be served on the host
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolReport {
    name: String,
    resource_name: String,
    mode: Mode,
    devices: Vec<DeviceDetails>,
}

/// The type representing the outcome of a validation request
#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct ValidateReply {
    success: bool,
    errors: Vec<ValidateErrorOut>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pools: Option<Vec<PoolReport>>,
}

impl From<&ValidateError> for ValidateReply {
    fn from(value: &ValidateError) -> Self {
        let r#type = value.get_type();
        ValidateReply {
            success: false,
            errors: value
                .get_msg()
                .into_iter()
                .map(|message| ValidateErrorOut {
                    r#type: r#type.to_owned(),
                    message,
                })
                .collect(),
            pools: None,
        }
    }
}

/// Build a validation reply to be output as YAML
fn build_reply(result: Result<Option<Vec<PoolReport>>, ValidateError>) -> ValidateReply {
    match result {
        Ok(pools) => ValidateReply {
            success: true,
            errors: vec![],
            pools,
        },
        Err(e) => ValidateReply::from(&e),
    }
}

fn read_config(path: Option<&PathBuf>) -> Result<ConfigFile, ValidateError> {
    if let Some(path) = path {
        return Ok(load_config_from_file(path)?);
    }
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| ValidateError::Environment(format!("Failed to read from stdin: {e}")))?;
    Ok(load_config_from_str(&input)?)
}

fn local_hostname() -> Result<String, ValidateError> {
    let name = nix::unistd::gethostname()
        .map_err(|e| ValidateError::Environment(format!("Failed to get the host name: {e}")))?;
    name.into_string()
        .map_err(|name| ValidateError::Environment(format!("Host name {name:?} is not valid text")))
}

/// Resolve the pools of `config` against the devices `net` sees.
async fn discover(
    config: &ConfigFile,
    net: Arc<dyn NetHandler>,
    hostname: &str,
) -> Result<Vec<PoolReport>, ValidateError> {
    let mut directory = DeviceDirectory::discover(net)
        .await
        .map_err(|e| ValidateError::Discovery(e.to_string()))?;
    let pools = build_pools(config, &mut directory, hostname).await;
    Ok(pools
        .into_iter()
        .map(|pool| PoolReport {
            devices: pool.devices.values().map(|d| d.details()).collect(),
            name: pool.name,
            resource_name: pool.resource_name,
            mode: pool.mode,
        })
        .collect())
}

async fn validate(args: &Args) -> Result<Option<Vec<PoolReport>>, ValidateError> {
    let config = read_config(args.config.as_ref())?;
    debug!("Configuration has {} pools", config.pools.len());
    if !args.discover {
        return Ok(None);
    }
    let hostname = match &args.hostname {
        Some(hostname) => hostname.clone(),
        None => local_hostname()?,
    };
    let net = Arc::new(KernelNetHandler::default());
    discover(&config, net, &hostname).await.map(Some)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    match tracectl::parse_level(&args.log_level) {
        Ok(level) => {
            if let Err(e) = tracectl::init_logging(level, None) {
                eprintln!("Failed to initialise logging: {e}");
            }
        }
        Err(e) => eprintln!("{e}"),
    }

    let reply = build_reply(validate(&args).await);
    if !reply.success {
        error!("Configuration is not valid");
    }
    match serde_yaml_ng::to_string(&reply) {
        Ok(out) => println!("{out}"),
        Err(e) => eprintln!("Failure serializing validation response: {e}"),
    }
    if !reply.success {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use interface_manager::testing::{FakeDevice, FakeNetHandler};
    use pretty_assertions::assert_eq;

    const CONFIG: &str = "
pools:
  - name: pool1
    mode: primary
    drivers:
      - name: i40e
        primary: 1
  - name: pool2
    mode: cdq
    nodes:
      - hostname: worker-1
        devices:
          - name: ens1f0
            secondary: 2
";

    fn net() -> Arc<FakeNetHandler> {
        Arc::new(FakeNetHandler::new(vec![
            FakeDevice::new("devA", "i40e", "0000:01:00.0", 0),
            FakeDevice::new("devB", "i40e", "0000:01:00.1", 0),
            FakeDevice::new("ens1f0", "ice", "0000:02:00.0", 4),
        ]))
    }

    fn names(report: &PoolReport) -> Vec<String> {
        report.devices.iter().map(|d| d.name.to_string()).collect()
    }

    #[test]
    fn invalid_configs_list_every_violation() {
        let err: ValidateError = load_config_from_str(
            "
pools:
  - name: pool1
    mode: primary
    uid: 5
    udsTimeout: 10
",
        )
        .unwrap_err()
        .into();
        let reply = build_reply(Err(err));
        assert!(!reply.success);
        assert!(reply.pools.is_none());
        assert!(reply.errors.len() >= 2);
        assert!(reply.errors.iter().all(|e| e.r#type == "Configuration"));
    }

    #[test]
    fn garbage_is_a_deserialization_error() {
        let err: ValidateError = load_config_from_str("{not: [valid").unwrap_err().into();
        let reply = build_reply(Err(err));
        assert_eq!(reply.errors.len(), 1);
        assert_eq!(reply.errors[0].r#type, "Deserialization");
    }

    #[test]
    fn missing_files_are_environment_errors() {
        let path = PathBuf::from("/nonexistent/afxdp/config.yaml");
        let err = read_config(Some(&path)).unwrap_err();
        assert_eq!(err.get_type(), "Environment");
    }

    #[test]
    fn successful_replies_have_no_errors() {
        let reply = build_reply(Ok(None));
        let yaml = serde_yaml_ng::to_string(&reply).unwrap();
        assert_eq!(yaml, "success: true\nerrors: []\n");
        let back: ValidateReply = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(back, reply);
    }

    #[tokio::test]
    async fn discovery_resolves_pools_for_the_node() {
        let config = load_config_from_str(CONFIG).unwrap();
        let pools = discover(&config, net(), "worker-1").await.unwrap();
        assert_eq!(pools.len(), 2);
        assert_eq!(pools[0].resource_name, "afxdp/pool1");
        assert_eq!(pools[0].mode, Mode::Primary);
        assert_eq!(pools[0].devices.len(), 1);
        assert_eq!(pools[1].mode, Mode::Cdq);
        assert_eq!(names(&pools[1]), vec!["ens1f0sf1", "ens1f0sf2"]);
        assert!(
            pools[1]
                .devices
                .iter()
                .all(|d| d.primary.as_ref().is_some_and(|p| p.as_str() == "ens1f0"))
        );
    }

    #[tokio::test]
    async fn node_selectors_of_other_nodes_are_ignored() {
        let config = load_config_from_str(CONFIG).unwrap();
        let pools = discover(&config, net(), "worker-2").await.unwrap();
        assert_eq!(pools[0].devices.len(), 1);
        assert!(pools[1].devices.is_empty());
    }
}
