// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fundamental types shared by other cumulus crates.
//!
//! This crate defines the small vocabulary types (lifecycle states, address
//! classes, MAC addresses) that the core library, its configuration, and the
//! standalone driver all need to agree on, so each of them can implement its
//! own conversions without any layering oddities.

use std::fmt::Display;
use std::io::{Error, ErrorKind};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// The desired lifecycle state of an instance, as requested by its owner.
///
/// This is independent of [`VmState`], which is what the hypervisor last
/// reported about the running machine.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InstanceState {
    /// The instance should be running.
    #[default]
    Start,
    /// The instance should be shut down.
    Stop,
    /// The running instance should be recycled, then return to `Start`.
    Restart,
    /// The instance should be removed along with its resources.
    Destroy,
    /// Teardown of the instance's VM is in progress.
    Cleanup,
}

/// The state of a virtual machine as reported by the hypervisor node.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VmState {
    Provisioning,
    Starting,
    Running,
    Stopped,
    Failed,
    Updating,
}

/// The state of a job reservation. Jobs only move forward, from `Reserved`
/// to one of the terminal states.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobState {
    Reserved,
    Failed,
    Finished,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Reserved)
    }
}

/// Classes of address allocations that can be withheld from an instance.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AddressClass {
    /// Externally routable addresses.
    External,
    /// Addresses on the host network.
    Host,
}

const MAC_ADDR_LEN: usize = 6;

/// An Ethernet MAC address. Supports conversion from a string formatted as
/// six colon-separated hex octets, e.g. "00:1a:2b:3c:4d:5e".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct MacAddr([u8; MAC_ADDR_LEN]);

impl MacAddr {
    pub const fn new(octets: [u8; MAC_ADDR_LEN]) -> Self {
        Self(octets)
    }

    #[inline]
    pub fn octets(&self) -> [u8; MAC_ADDR_LEN] {
        self.0
    }
}

impl FromStr for MacAddr {
    type Err = std::io::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; MAC_ADDR_LEN];
        let mut count = 0;
        for f in s.split(':') {
            if count >= MAC_ADDR_LEN || f.len() != 2 {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("Malformed MAC address {}", s),
                ));
            }
            octets[count] = u8::from_str_radix(f, 16).map_err(|e| {
                Self::Err::new(
                    ErrorKind::InvalidInput,
                    format!("Failed to parse MAC address {}: {}", s, e),
                )
            })?;
            count += 1;
        }

        if count != MAC_ADDR_LEN {
            return Err(Self::Err::new(
                ErrorKind::InvalidInput,
                format!(
                    "Expected {} octets in MAC address {}, got {}",
                    MAC_ADDR_LEN, s, count
                ),
            ));
        }

        Ok(Self(octets))
    }
}

impl Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl Serialize for MacAddr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(format!("{}", self).as_str())
    }
}

impl<'d> Deserialize<'d> for MacAddr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'d>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}
