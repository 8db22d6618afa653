// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Loading a JSON description of a node's world into the in-memory
//! backends.

use std::path::Path;

use anyhow::Context;
use cumulus::disk::{Disk, StoredDisks};
use cumulus::memory::MemoryCollection;
use cumulus::store::{self, Collection};
use cumulus::vm::VirtualMachineSpec;
use cumulus::vpc::{StoredVpcs, Vpc};
use cumulus::Instance;
use serde::Deserialize;

/// The state of the world as a JSON document. Instances that carry an id
/// are loaded as already-persisted records; the rest are inserted and
/// assigned one. `running` holds the specs currently active on the
/// hypervisor, matched to instances by id.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub vpcs: Vec<Vpc>,
    pub disks: Vec<Disk>,
    pub instances: Vec<Instance>,
    pub running: Vec<VirtualMachineSpec>,
}

pub fn load(path: &Path) -> anyhow::Result<Fixture> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading fixture {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("parsing fixture {}", path.display()))
}

pub struct Backends {
    pub instances: MemoryCollection,
    pub disks: MemoryCollection,
    pub vpcs: MemoryCollection,
    pub jobs: MemoryCollection,
    pub running: Vec<VirtualMachineSpec>,
}

impl Backends {
    pub fn new(fixture: Fixture) -> anyhow::Result<Self> {
        let backends = Backends {
            instances: MemoryCollection::new("instances"),
            disks: MemoryCollection::new("disks"),
            vpcs: MemoryCollection::new("vpcs"),
            jobs: MemoryCollection::new("tasks"),
            running: fixture.running,
        };

        let vpcs = StoredVpcs::new(&backends.vpcs);
        for vpc in &fixture.vpcs {
            vpcs.insert(vpc)
                .with_context(|| format!("loading vpc {}", vpc.id))?;
        }

        let disks = StoredDisks::new(&backends.disks);
        for disk in &fixture.disks {
            disks
                .insert(disk)
                .with_context(|| format!("loading disk {}", disk.id))?;
        }

        for mut inst in fixture.instances {
            match inst.id {
                Some(id) => {
                    let doc = store::to_document(&inst)?;
                    backends
                        .instances
                        .insert(Some(&id.to_string()), doc)
                        .with_context(|| format!("loading instance {id}"))?;
                }
                None => {
                    inst.insert(&backends.instances).with_context(|| {
                        format!("inserting instance {:?}", inst.name)
                    })?;
                }
            }
        }

        Ok(backends)
    }

    /// Every stored instance, in id order.
    pub fn stored_instances(&self) -> anyhow::Result<Vec<Instance>> {
        let mut out = Vec::new();
        for id in self.instances.ids()? {
            out.push(store::from_document(self.instances.find(&id)?)?);
        }
        Ok(out)
    }

    pub fn running_spec(&self, inst: &Instance) -> Option<&VirtualMachineSpec> {
        self.running.iter().find(|spec| Some(spec.id) == inst.id)
    }
}
