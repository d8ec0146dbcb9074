// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! CDQ subfunction management through the `devlink` tool.

use crate::pci::address::PciAddress;
use std::io;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, error};

/// Errors which may occur while interpreting the output of `devlink`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DevlinkParseError {
    #[error("no resource with size and occupancy found in devlink output")]
    NoResource,
    #[error("invalid number '{0}' in devlink output")]
    Number(String),
    #[error("occupancy {occ} exceeds size {size} in devlink output")]
    Occupancy { size: u32, occ: u32 },
    #[error("no port handle found in devlink output")]
    NoPort,
}

impl From<DevlinkParseError> for io::Error {
    fn from(value: DevlinkParseError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, value)
    }
}

fn keyed_value<'a>(fields: &[&'a str], key: &str) -> Option<&'a str> {
    fields
        .windows(2)
        .find(|pair| pair[0] == key)
        .map(|pair| pair[1])
}

fn number(text: &str) -> Result<u32, DevlinkParseError> {
    text.parse()
        .map_err(|_| DevlinkParseError::Number(text.to_owned()))
}

/// Interpret the output of `devlink resource show pci/<address>`.
///
/// The first resource line reporting both `size` and `occ` describes the
/// subfunction slots of the port; the number of free slots is returned.
///
/// # Errors
///
/// Fails if no such line exists or its values are malformed.
pub fn parse_available_subfunctions(output: &str) -> Result<u32, DevlinkParseError> {
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if let (Some(size), Some(occ)) = (keyed_value(&fields, "size"), keyed_value(&fields, "occ"))
        {
            let size = number(size)?;
            let occ = number(occ)?;
            return size
                .checked_sub(occ)
                .ok_or(DevlinkParseError::Occupancy { size, occ });
        }
    }
    Err(DevlinkParseError::NoResource)
}

/// Interpret the output of `devlink port add`, returning the handle of the new port
/// (e.g. `pci/0000:18:00.0/32768`).
///
/// # Errors
///
/// Fails if the output does not start with a port handle.
pub fn parse_port_handle(output: &str) -> Result<String, DevlinkParseError> {
    output
        .split_once(": ")
        .map(|(handle, _)| handle.trim())
        .filter(|handle| handle.starts_with("pci/"))
        .map(str::to_owned)
        .ok_or(DevlinkParseError::NoPort)
}

/// Interpret the output of `devlink port show`, returning the handle of the
/// port of subfunction `sfnum` under the port at `pci`.
///
/// # Errors
///
/// Fails if no such port is listed.
pub fn parse_subfunction_port(
    output: &str,
    pci: PciAddress,
    sfnum: u32,
) -> Result<String, DevlinkParseError> {
    let prefix = format!("pci/{pci}/");
    let sfnum = sfnum.to_string();
    output
        .lines()
        .filter(|line| line.starts_with(&prefix))
        .find(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            keyed_value(&fields, "flavour") == Some("pcisf")
                && keyed_value(&fields, "sfnum") == Some(sfnum.as_str())
        })
        .map_or(Err(DevlinkParseError::NoPort), parse_port_handle)
}

/// Runner for the `devlink` tool.
#[derive(Debug, Clone)]
pub struct Devlink {
    program: PathBuf,
}

impl Default for Devlink {
    fn default() -> Self {
        Self::new("devlink")
    }
}

impl Devlink {
    /// Use the `devlink` executable at `program`
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> io::Result<String> {
        debug!("Running {} {}", self.program.display(), args.join(" "));
        let output = Command::new(&self.program).args(args).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(
                "{} {} failed ({}): {}",
                self.program.display(),
                args.join(" "),
                output.status,
                stderr.trim()
            );
            return Err(io::Error::other(format!(
                "devlink {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        String::from_utf8(output.stdout)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Number of CDQ subfunctions the port at `pci` can still provide.
    ///
    /// # Errors
    ///
    /// Fails if devlink fails or reports no subfunction resource.
    pub async fn available_subfunctions(&self, pci: PciAddress) -> io::Result<u32> {
        let handle = format!("pci/{pci}");
        let output = self.run(&["resource", "show", &handle]).await?;
        Ok(parse_available_subfunctions(&output)?)
    }

    /// Create subfunction `sfnum` on the port at `pci` and activate it.
    /// Returns the devlink handle of the new port.
    ///
    /// # Errors
    ///
    /// Fails if either devlink step fails.
    pub async fn add_subfunction(&self, pci: PciAddress, sfnum: u32) -> io::Result<String> {
        let handle = format!("pci/{pci}");
        let sfnum = sfnum.to_string();
        let output = self
            .run(&[
                "port", "add", &handle, "flavour", "pcisf", "pfnum", "0", "sfnum", &sfnum,
            ])
            .await?;
        let port = parse_port_handle(&output)?;
        self.run(&["port", "function", "set", &port, "state", "active"])
            .await?;
        debug!("Created subfunction {sfnum} on {handle} as {port}");
        Ok(port)
    }

    /// Deactivate and delete subfunction `sfnum` of the port at `pci`.
    ///
    /// # Errors
    ///
    /// Fails if the subfunction port cannot be found or either devlink step fails.
    pub async fn delete_subfunction(&self, pci: PciAddress, sfnum: u32) -> io::Result<()> {
        let output = self.run(&["port", "show"]).await?;
        let port = parse_subfunction_port(&output, pci, sfnum)?;
        self.run(&["port", "function", "set", &port, "state", "inactive"])
            .await?;
        self.run(&["port", "del", &port]).await?;
        debug!("Deleted subfunction {sfnum} of pci/{pci} ({port})");
        Ok(())
    }
}
