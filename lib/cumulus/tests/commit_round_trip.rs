// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Whole-document and field-subset commits must leave collaborators in the
//! same state when applied to the same change.

use cumulus::disk::{Disk, DiskStore, StoredDisks};
use cumulus::instance::{CommitServices, PostCommitOutcome};
use cumulus::memory::{
    AddressLease, LeaseScope, MemoryAddresses, MemoryCollection,
};
use cumulus::store::Collection;
use cumulus::vpc::{StoredVpcs, Subnet, Vpc};
use cumulus::Instance;
use cumulus_types::{AddressClass, InstanceState};
use uuid::Uuid;

struct World {
    instances: MemoryCollection,
    disks: MemoryCollection,
    vpcs: MemoryCollection,
    addresses: MemoryAddresses,
    old_vpc: Vpc,
    new_vpc: Vpc,
}

fn vpc(name: &str) -> Vpc {
    Vpc {
        id: Uuid::new_v4(),
        name: name.to_string(),
        subnets: vec![Subnet {
            id: Uuid::new_v4(),
            name: format!("{name}-primary"),
            network: "10.196.0.0/20".to_string(),
        }],
    }
}

fn world() -> World {
    let world = World {
        instances: MemoryCollection::new("instances"),
        disks: MemoryCollection::new("disks"),
        vpcs: MemoryCollection::new("vpcs"),
        addresses: MemoryAddresses::new(),
        old_vpc: vpc("blue"),
        new_vpc: vpc("green"),
    };
    let vpcs = StoredVpcs::new(&world.vpcs);
    vpcs.insert(&world.old_vpc).unwrap();
    vpcs.insert(&world.new_vpc).unwrap();
    world
}

fn placed_instance(world: &World) -> Instance {
    let mut inst = Instance {
        organization: Some(Uuid::new_v4()),
        zone: Some(Uuid::new_v4()),
        node: Some(Uuid::new_v4()),
        image: Some(Uuid::new_v4()),
        vpc: Some(world.old_vpc.id),
        subnet: Some(world.old_vpc.subnets[0].id),
        state: InstanceState::Stop,
        restart: true,
        memory: 1024,
        processors: 2,
        ..Default::default()
    };
    inst.validate(&StoredVpcs::new(&world.vpcs)).unwrap();
    let id = inst.insert(&world.instances).unwrap();

    let disks = StoredDisks::new(&world.disks);
    for index in ["0", "1"] {
        disks
            .insert(&Disk {
                id: Uuid::new_v4(),
                name: format!("disk{index}"),
                instance: Some(id),
                index: index.to_string(),
                delete_protection: false,
            })
            .unwrap();
    }

    for (scope, address) in [
        (LeaseScope::Vpc(world.old_vpc.id), "10.196.0.5"),
        (LeaseScope::Block(AddressClass::External), "203.0.113.9"),
        (LeaseScope::Block(AddressClass::Host), "198.18.84.2"),
    ] {
        world.addresses.lease(AddressLease {
            instance: id,
            scope,
            address: address.to_string(),
        });
    }
    inst
}

fn apply_change(
    world: &World,
    fields: Option<&[&str]>,
) -> (Instance, PostCommitOutcome) {
    let log = slog::Logger::root(slog::Discard, slog::o!());
    let mut inst = placed_instance(world);
    let disks = StoredDisks::new(&world.disks);
    let svc = CommitServices {
        log: &log,
        instances: &world.instances,
        disks: &disks,
        addresses: &world.addresses,
    };

    let new_vpc = world.new_vpc.id;
    let new_subnet = world.new_vpc.subnets[0].id;
    let outcome = inst
        .update(&svc, &StoredVpcs::new(&world.vpcs), fields, |i| {
            i.vpc = Some(new_vpc);
            i.subnet = Some(new_subnet);
            i.state = InstanceState::Start;
            i.restart = true;
            i.delete_protection = true;
            i.no_public_address = true;
            i.no_host_address = true;
        })
        .unwrap();
    (inst, outcome)
}

#[test]
fn full_and_partial_commits_have_the_same_effects() {
    const CHANGED: &[&str] = &[
        "vpc",
        "subnet",
        "state",
        "restart",
        "delete_protection",
        "no_public_address",
        "no_host_address",
    ];

    let full = world();
    let (full_inst, full_outcome) = apply_change(&full, None);
    let partial = world();
    let (partial_inst, partial_outcome) = apply_change(&partial, Some(CHANGED));

    assert_eq!(full_outcome, partial_outcome);
    assert_eq!(
        full_outcome,
        PostCommitOutcome { disks_changed: true, restart_cleared: true }
    );

    for (world, inst) in [(&full, &full_inst), (&partial, &partial_inst)] {
        let id = inst.id.unwrap();

        // Every lease the change invalidated is gone.
        assert!(world.addresses.leases().is_empty());

        let disks = StoredDisks::new(&world.disks).instance_disks(id).unwrap();
        assert_eq!(disks.len(), 2);
        assert!(disks.iter().all(|d| d.delete_protection));

        let stored = Instance::get(&world.instances, id).unwrap();
        assert_eq!(stored.vpc, Some(world.new_vpc.id));
        assert_eq!(stored.state, InstanceState::Start);
        assert!(!stored.restart && !stored.restart_block_ip);
        assert!(stored.no_public_address && stored.no_host_address);
        assert_eq!(world.instances.ids().unwrap().len(), 1);
    }
}

#[test]
fn releases_use_the_previous_vpc() {
    let world = world();
    let (inst, _) = apply_change(&world, None);
    let id = inst.id.unwrap();

    // An address leased in the new VPC after the move survives a second,
    // unrelated update.
    world.addresses.lease(AddressLease {
        instance: id,
        scope: LeaseScope::Vpc(world.new_vpc.id),
        address: "10.196.0.77".to_string(),
    });

    let log = slog::Logger::root(slog::Discard, slog::o!());
    let disks = StoredDisks::new(&world.disks);
    let svc = CommitServices {
        log: &log,
        instances: &world.instances,
        disks: &disks,
        addresses: &world.addresses,
    };
    let mut inst = inst;
    let outcome = inst
        .update(&svc, &StoredVpcs::new(&world.vpcs), Some(&["memory"]), |i| {
            i.memory = 8192
        })
        .unwrap();

    assert_eq!(outcome, PostCommitOutcome::default());
    assert_eq!(world.addresses.leases().len(), 1);
    assert_eq!(Instance::get(&world.instances, id).unwrap().memory, 8192);
}
