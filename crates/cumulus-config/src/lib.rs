// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// How long job reservations are kept before being purged: 30 days.
pub const DEFAULT_JOB_RETENTION_HOURS: u64 = 720;

/// How long a fetched interface list stays fresh.
pub const DEFAULT_INTERFACE_REFRESH_SECS: u64 = 15;

pub const DEFAULT_HOST_BRIDGE: &str = "cumulushost0";

/// Configuration for one orchestrator node.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Config {
    pub node: Node,

    #[serde(default)]
    pub jobs: Jobs,

    #[serde(default)]
    pub network: Network,
}

impl Config {
    /// Constructs a new configuration object with default `jobs` and
    /// `network` sections.
    ///
    /// Typically, the configuration is parsed from a config file via
    /// [`parse`], but this method allows an alternative mechanism for
    /// initialization.
    pub fn new<P: Into<PathBuf>>(
        node_id: Uuid,
        usb_passthrough: bool,
        disks_path: P,
    ) -> Config {
        Config {
            node: Node {
                id: node_id,
                usb_passthrough,
                disks_path: disks_path.into(),
            },
            jobs: Jobs::default(),
            network: Network::default(),
        }
    }
}

/// The node executing reconciliation and the capabilities it advertises.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Node {
    pub id: Uuid,

    /// Whether USB devices may be passed through to guests on this node.
    #[serde(default)]
    pub usb_passthrough: bool,

    /// Directory holding the backing files of instance disks.
    pub disks_path: PathBuf,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Jobs {
    /// Jobs older than this are purged regardless of their state.
    #[serde(default = "default_job_retention_hours")]
    pub retention_hours: u64,
}

impl Jobs {
    /// The retention window. Absurdly large settings saturate.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours.saturating_mul(60 * 60))
    }
}

impl Default for Jobs {
    fn default() -> Self {
        Self { retention_hours: DEFAULT_JOB_RETENTION_HOURS }
    }
}

fn default_job_retention_hours() -> u64 {
    DEFAULT_JOB_RETENTION_HOURS
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Network {
    #[serde(default = "default_interface_refresh_secs")]
    pub interface_refresh_secs: u64,

    /// Name of the host bridge, which is never reported as a usable
    /// interface.
    #[serde(default = "default_host_bridge")]
    pub host_bridge: String,
}

impl Network {
    pub fn interface_refresh(&self) -> Duration {
        Duration::from_secs(self.interface_refresh_secs)
    }
}

impl Default for Network {
    fn default() -> Self {
        Self {
            interface_refresh_secs: DEFAULT_INTERFACE_REFRESH_SECS,
            host_bridge: DEFAULT_HOST_BRIDGE.to_string(),
        }
    }
}

fn default_interface_refresh_secs() -> u64 {
    DEFAULT_INTERFACE_REFRESH_SECS
}

fn default_host_bridge() -> String {
    DEFAULT_HOST_BRIDGE.to_string()
}

/// Errors which may be returned when parsing the node configuration.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Cannot parse toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parses a TOML file into a configuration object.
pub fn parse<P: AsRef<Path>>(path: P) -> Result<Config, ParseError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let cfg = toml::from_str::<Config>(&contents)?;
    Ok(cfg)
}
