// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Comparing a desired run specification against the running one.

use std::collections::{BTreeMap, BTreeSet};

use super::{DiskMount, VirtualMachineSpec};

/// Disk mounts to apply to a running VM. Removals go first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiskChanges {
    pub add: Vec<DiskMount>,
    pub remove: Vec<DiskMount>,
}

impl DiskChanges {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

impl VirtualMachineSpec {
    /// Whether `current` must be reconfigured (or restarted) to match this
    /// spec. Adapters and USB devices are compared by position, and only
    /// up to the length of this spec's lists. Disks are not considered; see
    /// [`VirtualMachineSpec::disk_changes`].
    pub fn changed(&self, current: &VirtualMachineSpec) -> bool {
        if self.memory != current.memory
            || self.processors != current.processors
            || self.vnc != current.vnc
            || self.vnc_display != current.vnc_display
            || self.no_public_address != current.no_public_address
            || self.no_host_address != current.no_host_address
        {
            return true;
        }

        let adapters_differ =
            self.network_adapters.iter().enumerate().any(|(i, adapter)| {
                current.network_adapters.get(i).map_or(true, |cur| {
                    adapter.vpc != cur.vpc || adapter.subnet != cur.subnet
                })
            });
        if adapters_differ {
            return true;
        }

        self.usb_devices.iter().enumerate().any(|(i, device)| {
            current.usb_devices.get(i).map_or(true, |cur| {
                device.vendor != cur.vendor || device.product != cur.product
            })
        })
    }

    /// Disk mounts to add to and remove from `current`, keyed by index.
    ///
    /// A disk whose index is kept but whose path changed is removed and
    /// re-added; the hypervisor addresses mounts by path, so it can never
    /// be updated in place.
    pub fn disk_changes(&self, current: &VirtualMachineSpec) -> DiskChanges {
        let desired: BTreeSet<u32> =
            self.disks.iter().map(|disk| disk.index).collect();

        let mut changes = DiskChanges::default();
        let mut kept = BTreeMap::new();
        for disk in &current.disks {
            if desired.contains(&disk.index) {
                kept.insert(disk.index, disk);
            } else {
                changes.remove.push(disk.clone());
            }
        }

        for disk in &self.disks {
            match kept.get(&disk.index) {
                None => changes.add.push(disk.clone()),
                Some(cur) if cur.path != disk.path => {
                    changes.remove.push((*cur).clone());
                    changes.add.push(disk.clone());
                }
                Some(_) => {}
            }
        }

        changes
    }
}
