// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A builder for run specifications.

use std::collections::BTreeSet;

use thiserror::Error;

use super::{
    adapter_mac, AdapterType, DiskMount, NetworkAdapter, UsbPassthrough,
    VirtualMachineSpec,
};
use crate::disk::Disk;
use crate::instance::Instance;
use crate::node::NodeCapabilities;
use crate::usb::UsbDevice;

/// Errors that can arise while building a run specification.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SpecBuilderError {
    #[error("instance has not been assigned an id")]
    MissingId,

    #[error("instance has no {0}")]
    MissingReference(&'static str),
}

#[derive(Debug)]
pub struct SpecBuilder {
    spec: VirtualMachineSpec,
    disk_indices: BTreeSet<u32>,
}

impl SpecBuilder {
    /// Starts a specification for a validated instance. The instance's
    /// single bridge adapter is added here.
    pub fn new(instance: &Instance) -> Result<Self, SpecBuilderError> {
        let id = instance.id.ok_or(SpecBuilderError::MissingId)?;
        let image =
            instance.image.ok_or(SpecBuilderError::MissingReference("image"))?;
        let vpc =
            instance.vpc.ok_or(SpecBuilderError::MissingReference("vpc"))?;
        let subnet = instance
            .subnet
            .ok_or(SpecBuilderError::MissingReference("subnet"))?;

        Ok(Self {
            spec: VirtualMachineSpec {
                id,
                image,
                processors: instance.processors,
                memory: instance.memory,
                vnc: instance.vnc,
                vnc_display: instance.vnc_display,
                disks: Vec::new(),
                network_adapters: vec![NetworkAdapter {
                    kind: AdapterType::Bridge,
                    mac_address: adapter_mac(id, vpc),
                    vpc,
                    subnet,
                }],
                usb_devices: Vec::new(),
                no_public_address: instance.no_public_address,
                no_host_address: instance.no_host_address,
            },
            disk_indices: BTreeSet::new(),
        })
    }

    /// Mounts `disk` at its index and reports whether it was mounted.
    ///
    /// A disk is skipped if its index is not an integer, is negative (a
    /// stored `"-1"` parses but names no slot), or is already taken by an
    /// earlier disk.
    pub fn add_disk(
        &mut self,
        disk: &Disk,
        node: &dyn NodeCapabilities,
    ) -> bool {
        let Some(index) = disk
            .index
            .parse::<i64>()
            .ok()
            .and_then(|index| u32::try_from(index).ok())
        else {
            return false;
        };
        if !self.disk_indices.insert(index) {
            return false;
        }

        let path = node.disk_path(disk.id);
        self.spec.disks.push(DiskMount { index, path });
        true
    }

    /// Passes `devices` through to the guest if the node allows it.
    pub fn add_usb_devices(
        &mut self,
        devices: &[UsbDevice],
        node: &dyn NodeCapabilities,
    ) {
        if !node.usb_passthrough() {
            return;
        }

        self.spec.usb_devices.extend(devices.iter().map(|device| {
            UsbPassthrough {
                vendor: device.vendor.clone(),
                product: device.product.clone(),
            }
        }));
    }

    pub fn finish(self) -> VirtualMachineSpec {
        self.spec
    }
}

/// Builds the run specification for `instance` with its attached `disks`,
/// in the order given. Disks [`SpecBuilder::add_disk`] skips are left out;
/// only an instance missing its placement fails.
pub fn build_spec(
    instance: &Instance,
    disks: &[Disk],
    node: &dyn NodeCapabilities,
) -> Result<VirtualMachineSpec, SpecBuilderError> {
    let mut builder = SpecBuilder::new(instance)?;
    for disk in disks {
        builder.add_disk(disk, node);
    }
    builder.add_usb_devices(&instance.usb_devices, node);
    Ok(builder.finish())
}
