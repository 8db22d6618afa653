// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Run specifications: what a hypervisor needs to configure one VM.
//!
//! A [`VirtualMachineSpec`] is derived from an [`Instance`](crate::instance::Instance)
//! on every reconciliation pass and compared against the one the hypervisor
//! is currently running. It is never persisted.

use std::path::PathBuf;

use cumulus_types::MacAddr;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub mod builder;
pub mod diff;

pub use builder::{build_spec, SpecBuilder, SpecBuilderError};
pub use diff::DiskChanges;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterType {
    Bridge,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskMount {
    pub index: u32,
    pub path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAdapter {
    #[serde(rename = "type")]
    pub kind: AdapterType,
    pub mac_address: MacAddr,
    pub vpc: Uuid,
    pub subnet: Uuid,
}

/// A passed-through USB device. Only the filtered ids are carried.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbPassthrough {
    pub vendor: String,
    pub product: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachineSpec {
    pub id: Uuid,
    pub image: Uuid,
    pub processors: u32,
    pub memory: u32,
    pub vnc: bool,
    pub vnc_display: u32,
    pub disks: Vec<DiskMount>,
    pub network_adapters: Vec<NetworkAdapter>,
    pub usb_devices: Vec<UsbPassthrough>,
    pub no_public_address: bool,
    pub no_host_address: bool,
}

// First octet of every derived MAC; the other five come from the hash.
const MAC_PREFIX: u8 = 0x00;

fn derive_mac(tag: &[u8], instance: Uuid, vpc: Uuid) -> MacAddr {
    let digest = Sha256::new()
        .chain_update(tag)
        .chain_update(instance.as_bytes())
        .chain_update(vpc.as_bytes())
        .finalize();
    MacAddr::new([
        MAC_PREFIX, digest[0], digest[1], digest[2], digest[3], digest[4],
    ])
}

/// MAC of the instance's adapter on its VPC bridge. Stable for a given
/// instance and VPC.
pub fn adapter_mac(instance: Uuid, vpc: Uuid) -> MacAddr {
    derive_mac(b"adapter", instance, vpc)
}

/// MAC the instance presents on the external network.
pub fn external_mac(instance: Uuid, vpc: Uuid) -> MacAddr {
    derive_mac(b"external", instance, vpc)
}
