// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! What the local node can do, and a cache of its usable network interfaces.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use slog::debug;
use uuid::Uuid;

/// Capabilities of the node running reconciliation.
pub trait NodeCapabilities {
    /// Whether USB devices may be passed through to guests.
    fn usb_passthrough(&self) -> bool;

    /// Location of the backing file for `disk` on this node.
    fn disk_path(&self, disk: Uuid) -> PathBuf;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeProfile {
    pub id: Uuid,
    pub usb_passthrough: bool,
    pub disks_path: PathBuf,
}

impl From<&cumulus_config::Node> for NodeProfile {
    fn from(cfg: &cumulus_config::Node) -> Self {
        Self {
            id: cfg.id,
            usb_passthrough: cfg.usb_passthrough,
            disks_path: cfg.disks_path.clone(),
        }
    }
}

impl NodeCapabilities for NodeProfile {
    fn usb_passthrough(&self) -> bool {
        self.usb_passthrough
    }

    fn disk_path(&self, disk: Uuid) -> PathBuf {
        self.disks_path.join(format!("{disk}.qcow2"))
    }
}

/// A source of monotonic time, injectable so cache expiry can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Lists the names of all network interfaces present on the host.
pub trait InterfaceSource: Send + Sync {
    fn interfaces(&self) -> io::Result<Vec<String>>;
}

/// Reads interface names from a sysfs-style directory.
pub struct SysfsInterfaces {
    root: PathBuf,
}

impl SysfsInterfaces {
    pub fn new() -> Self {
        Self::with_root("/sys/class/net")
    }

    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
}

impl Default for SysfsInterfaces {
    fn default() -> Self {
        Self::new()
    }
}

impl InterfaceSource for SysfsInterfaces {
    fn interfaces(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

/// Instance tap interfaces have generated names of exactly this length.
const GENERATED_IFACE_LEN: usize = 14;

/// The host's usable uplink interfaces, refreshed at most once per interval.
///
/// Loopback, bridges, the host bridge, and interfaces created for instances
/// are filtered out.
pub struct InterfaceCache<S, C> {
    log: slog::Logger,
    source: S,
    clock: C,
    refresh: Duration,
    host_bridge: String,
    cached: Mutex<Option<(Instant, Vec<String>)>>,
}

impl<S: InterfaceSource, C: Clock> InterfaceCache<S, C> {
    pub fn new(
        log: &slog::Logger,
        source: S,
        clock: C,
        network: &cumulus_config::Network,
    ) -> Self {
        Self {
            log: log.clone(),
            source,
            clock,
            refresh: network.interface_refresh(),
            host_bridge: network.host_bridge.clone(),
            cached: Mutex::new(None),
        }
    }

    pub fn interfaces(&self) -> io::Result<Vec<String>> {
        let mut cached = self.cached.lock().unwrap();
        let now = self.clock.now();
        if let Some((fetched, ifaces)) = cached.as_ref() {
            if now.saturating_duration_since(*fetched) < self.refresh {
                return Ok(ifaces.clone());
            }
        }

        let ifaces: Vec<String> = self
            .source
            .interfaces()?
            .into_iter()
            .filter(|iface| self.is_usable(iface))
            .collect();
        debug!(self.log, "refreshed interface list";
               "interfaces" => ?ifaces);

        *cached = Some((now, ifaces.clone()));
        Ok(ifaces)
    }

    fn is_usable(&self, iface: &str) -> bool {
        !(iface.len() == GENERATED_IFACE_LEN
            || iface == "lo"
            || iface.contains("br")
            || iface == self.host_bridge)
    }
}
