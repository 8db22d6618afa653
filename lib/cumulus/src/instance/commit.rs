// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Persisting instance changes and the side effects they trigger.
//!
//! A change goes through four steps, in order:
//!
//! 1. [`Instance::pre_commit`] captures a [`CommitSnapshot`] of the fields
//!    side effects compare against. This must happen before any new value
//!    is applied to the instance.
//! 2. The caller applies the new values (and usually re-validates).
//! 3. [`Instance::commit`] or [`Instance::commit_fields`] persists them.
//! 4. [`Instance::post_commit`] runs, only after the persist succeeded, and
//!    fires each side effect whose field actually changed.
//!
//! Edits to one instance must be serialized by the caller. Side effects are
//! releases and flag propagation, so repeating one after a racing writer in
//! another process is harmless.

use cumulus_types::{AddressClass, InstanceState};
use slog::info;
use uuid::Uuid;

use super::Instance;
use crate::address::AddressAllocator;
use crate::disk::DiskStore;
use crate::error::Error;
use crate::store::{self, Collection, Document};
use crate::vpc::VpcLookup;

/// The pre-change values of every field a post-commit side effect depends
/// on. Owned by the update in flight, never by the instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitSnapshot {
    pub vpc: Option<Uuid>,
    pub subnet: Option<Uuid>,
    pub delete_protection: bool,
    pub state: InstanceState,
    pub no_public_address: bool,
    pub no_host_address: bool,
}

/// The collaborators post-commit side effects act on.
pub struct CommitServices<'a> {
    pub log: &'a slog::Logger,
    pub instances: &'a dyn Collection,
    pub disks: &'a dyn DiskStore,
    pub addresses: &'a dyn AddressAllocator,
}

/// What [`Instance::post_commit`] did that its caller may need to react to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PostCommitOutcome {
    /// Delete protection was propagated to the instance's disks.
    pub disks_changed: bool,
    /// Pending restart requests were dropped because the state changed.
    pub restart_cleared: bool,
}

const RESTART_FIELDS: [&str; 2] = ["restart", "restart_block_ip"];

impl Instance {
    pub fn pre_commit(&self) -> CommitSnapshot {
        CommitSnapshot {
            vpc: self.vpc,
            subnet: self.subnet,
            delete_protection: self.delete_protection,
            state: self.state,
            no_public_address: self.no_public_address,
            no_host_address: self.no_host_address,
        }
    }

    /// Persists the whole instance.
    pub fn commit(&self, coll: &dyn Collection) -> Result<(), Error> {
        let id = self.require_id()?;
        coll.replace(&id.to_string(), store::to_document(self)?)?;
        Ok(())
    }

    /// Persists only the named fields, leaving concurrent changes to any
    /// other field intact.
    pub fn commit_fields(
        &self,
        coll: &dyn Collection,
        fields: &[&str],
    ) -> Result<(), Error> {
        let id = self.require_id()?;
        let mut doc = store::to_document(self)?;

        let mut update = Document::new();
        for field in fields {
            let value = doc.remove(*field).ok_or_else(|| {
                Error::Invariant(format!("instance has no field {field:?}"))
            })?;
            update.insert(field.to_string(), value);
        }

        coll.update_fields(&id.to_string(), update)?;
        Ok(())
    }

    /// Fires the side effects of the change from `before` to the current
    /// (already persisted) values. The first failing side effect aborts the
    /// rest; since each one is idempotent, the caller may simply retry.
    pub fn post_commit(
        &mut self,
        before: &CommitSnapshot,
        svc: &CommitServices<'_>,
    ) -> Result<PostCommitOutcome, Error> {
        let id = self.require_id()?;
        let log = svc.log;
        let mut outcome = PostCommitOutcome::default();

        let vpc_changed = before.vpc.is_some() && before.vpc != self.vpc;
        let subnet_changed =
            before.subnet.is_some() && before.subnet != self.subnet;
        if vpc_changed || subnet_changed {
            if let Some(old_vpc) = before.vpc {
                svc.addresses.release_instance_ip(id, old_vpc)?;
                info!(log, "released address in previous vpc";
                      "instance" => %id, "vpc" => %old_vpc);
            }
        }

        if before.delete_protection != self.delete_protection {
            svc.disks.set_delete_protection(id, self.delete_protection)?;
            outcome.disks_changed = true;
            info!(log, "updated disk delete protection";
                  "instance" => %id,
                  "delete_protection" => self.delete_protection);
        }

        if before.state != self.state
            && matches!(
                self.state,
                InstanceState::Stop
                    | InstanceState::Start
                    | InstanceState::Restart
            )
            && (self.restart || self.restart_block_ip)
        {
            self.restart = false;
            self.restart_block_ip = false;
            self.commit_fields(svc.instances, &RESTART_FIELDS)?;
            outcome.restart_cleared = true;
            info!(log, "cleared pending restart";
                  "instance" => %id, "state" => %self.state);
        }

        if !before.no_public_address && self.no_public_address {
            svc.addresses
                .release_instance_addresses(id, AddressClass::External)?;
            info!(log, "released external addresses"; "instance" => %id);
        }

        if !before.no_host_address && self.no_host_address {
            svc.addresses.release_instance_addresses(id, AddressClass::Host)?;
            info!(log, "released host addresses"; "instance" => %id);
        }

        Ok(outcome)
    }

    /// Runs a complete update: snapshot, `mutate`, validate, persist and
    /// post-commit. With `fields` set only those fields are persisted.
    ///
    /// Nothing is persisted if validation fails, and no side effect fires
    /// if persisting fails.
    pub fn update<F>(
        &mut self,
        svc: &CommitServices<'_>,
        vpcs: &dyn VpcLookup,
        fields: Option<&[&str]>,
        mutate: F,
    ) -> Result<PostCommitOutcome, Error>
    where
        F: FnOnce(&mut Instance),
    {
        let before = self.pre_commit();
        mutate(self);
        self.validate(vpcs)?;
        match fields {
            Some(fields) => self.commit_fields(svc.instances, fields)?,
            None => self.commit(svc.instances)?,
        }
        self.post_commit(&before, svc)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::address::MockAddressAllocator;
    use crate::disk::MockDiskStore;
    use crate::memory::MemoryCollection;
    use crate::vpc::{MockVpcLookup, Subnet, Vpc};
    use mockall::predicate::eq;

    fn test_logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn vpc_with_subnet() -> Vpc {
        Vpc {
            id: Uuid::new_v4(),
            name: "vpc".to_string(),
            subnets: vec![Subnet {
                id: Uuid::new_v4(),
                name: "primary".to_string(),
                network: "10.97.0.0/24".to_string(),
            }],
        }
    }

    fn stored_instance(coll: &MemoryCollection, vpc: &Vpc) -> Instance {
        let mut inst = Instance {
            organization: Some(Uuid::new_v4()),
            zone: Some(Uuid::new_v4()),
            node: Some(Uuid::new_v4()),
            image: Some(Uuid::new_v4()),
            vpc: Some(vpc.id),
            subnet: Some(vpc.subnets[0].id),
            memory: 1024,
            processors: 2,
            ..Default::default()
        };
        inst.insert(coll).unwrap();
        inst
    }

    /// Collaborators that fail the test if any side effect fires.
    fn quiet_collaborators() -> (MockDiskStore, MockAddressAllocator) {
        let mut disks = MockDiskStore::new();
        disks.expect_set_delete_protection().never();
        let mut addresses = MockAddressAllocator::new();
        addresses.expect_release_instance_ip().never();
        addresses.expect_release_instance_addresses().never();
        (disks, addresses)
    }

    #[test]
    fn memory_change_fires_nothing() {
        let log = test_logger();
        let coll = MemoryCollection::new("instances");
        let vpc = vpc_with_subnet();
        let mut inst = stored_instance(&coll, &vpc);
        let (disks, addresses) = quiet_collaborators();
        let svc = CommitServices {
            log: &log,
            instances: &coll,
            disks: &disks,
            addresses: &addresses,
        };

        let before = inst.pre_commit();
        inst.memory = 4096;
        inst.commit_fields(&coll, &["memory"]).unwrap();
        let outcome = inst.post_commit(&before, &svc).unwrap();
        assert_eq!(outcome, PostCommitOutcome::default());

        let id = inst.id.unwrap();
        assert_eq!(Instance::get(&coll, id).unwrap().memory, 4096);
    }

    #[test]
    fn start_clears_restart_requested_in_same_update() {
        let log = test_logger();
        let coll = MemoryCollection::new("instances");
        let vpc = vpc_with_subnet();
        let mut inst = stored_instance(&coll, &vpc);
        inst.state = InstanceState::Stop;
        inst.commit(&coll).unwrap();
        let (disks, addresses) = quiet_collaborators();
        let svc = CommitServices {
            log: &log,
            instances: &coll,
            disks: &disks,
            addresses: &addresses,
        };

        let before = inst.pre_commit();
        inst.state = InstanceState::Start;
        inst.restart = true;
        inst.restart_block_ip = true;
        inst.commit(&coll).unwrap();
        let outcome = inst.post_commit(&before, &svc).unwrap();

        assert!(outcome.restart_cleared);
        assert!(!inst.restart && !inst.restart_block_ip);
        let stored = Instance::get(&coll, inst.id.unwrap()).unwrap();
        assert!(!stored.restart && !stored.restart_block_ip);
        assert_eq!(stored.state, InstanceState::Start);
    }

    #[test]
    fn state_changes_that_clear_restart_flags() {
        for (from, to) in [
            (InstanceState::Start, InstanceState::Restart),
            (InstanceState::Start, InstanceState::Stop),
            (InstanceState::Restart, InstanceState::Stop),
            (InstanceState::Stop, InstanceState::Restart),
        ] {
            let log = test_logger();
            let coll = MemoryCollection::new("instances");
            let vpc = vpc_with_subnet();
            let mut inst = stored_instance(&coll, &vpc);
            inst.state = from;
            inst.commit(&coll).unwrap();
            let (disks, addresses) = quiet_collaborators();
            let svc = CommitServices {
                log: &log,
                instances: &coll,
                disks: &disks,
                addresses: &addresses,
            };

            let before = inst.pre_commit();
            inst.state = to;
            inst.restart = true;
            inst.restart_block_ip = true;
            inst.commit(&coll).unwrap();
            let outcome = inst.post_commit(&before, &svc).unwrap();

            assert!(outcome.restart_cleared, "{from} -> {to}");
            assert!(!inst.restart && !inst.restart_block_ip);
            let stored = Instance::get(&coll, inst.id.unwrap()).unwrap();
            assert!(!stored.restart && !stored.restart_block_ip);
            assert_eq!(stored.state, to);
        }
    }

    #[test]
    fn teardown_states_leave_restart_flags_alone() {
        for to in [InstanceState::Destroy, InstanceState::Cleanup] {
            let log = test_logger();
            let coll = MemoryCollection::new("instances");
            let vpc = vpc_with_subnet();
            let mut inst = stored_instance(&coll, &vpc);
            let (disks, addresses) = quiet_collaborators();
            let svc = CommitServices {
                log: &log,
                instances: &coll,
                disks: &disks,
                addresses: &addresses,
            };

            // Straight through post_commit, without validate clearing them.
            let before = inst.pre_commit();
            inst.state = to;
            inst.restart = true;
            inst.restart_block_ip = true;
            inst.commit(&coll).unwrap();
            let outcome = inst.post_commit(&before, &svc).unwrap();

            assert!(!outcome.restart_cleared, "start -> {to}");
            assert!(inst.restart && inst.restart_block_ip);
            let stored = Instance::get(&coll, inst.id.unwrap()).unwrap();
            assert!(stored.restart && stored.restart_block_ip);
        }
    }

    #[test]
    fn unchanged_state_keeps_restart_request() {
        let log = test_logger();
        let coll = MemoryCollection::new("instances");
        let vpc = vpc_with_subnet();
        let mut inst = stored_instance(&coll, &vpc);
        let (disks, addresses) = quiet_collaborators();
        let svc = CommitServices {
            log: &log,
            instances: &coll,
            disks: &disks,
            addresses: &addresses,
        };

        let before = inst.pre_commit();
        inst.restart = true;
        inst.commit(&coll).unwrap();
        let outcome = inst.post_commit(&before, &svc).unwrap();
        assert!(!outcome.restart_cleared);
        assert!(inst.restart);
    }

    #[test]
    fn vpc_move_releases_old_address() {
        let log = test_logger();
        let coll = MemoryCollection::new("instances");
        let old = vpc_with_subnet();
        let new = vpc_with_subnet();
        let mut inst = stored_instance(&coll, &old);
        let id = inst.id.unwrap();

        let disks = MockDiskStore::new();
        let mut addresses = MockAddressAllocator::new();
        addresses
            .expect_release_instance_ip()
            .with(eq(id), eq(old.id))
            .times(1)
            .returning(|_, _| Ok(()));
        let svc = CommitServices {
            log: &log,
            instances: &coll,
            disks: &disks,
            addresses: &addresses,
        };

        let mut vpcs = MockVpcLookup::new();
        let lookup = new.clone();
        vpcs.expect_get_vpc().returning(move |_| Ok(lookup.clone()));

        let subnet = new.subnets[0].id;
        inst.update(&svc, &vpcs, None, |i| {
            i.vpc = Some(new.id);
            i.subnet = Some(subnet);
        })
        .unwrap();
    }

    #[test]
    fn subnet_move_within_vpc_releases_address() {
        let log = test_logger();
        let coll = MemoryCollection::new("instances");
        let vpc = vpc_with_subnet();
        let mut inst = stored_instance(&coll, &vpc);
        let id = inst.id.unwrap();

        let disks = MockDiskStore::new();
        let mut addresses = MockAddressAllocator::new();
        addresses
            .expect_release_instance_ip()
            .with(eq(id), eq(vpc.id))
            .times(1)
            .returning(|_, _| Ok(()));
        let svc = CommitServices {
            log: &log,
            instances: &coll,
            disks: &disks,
            addresses: &addresses,
        };

        let before = inst.pre_commit();
        inst.subnet = Some(Uuid::new_v4());
        inst.commit(&coll).unwrap();
        inst.post_commit(&before, &svc).unwrap();
    }

    #[test]
    fn flag_transitions_fire_once() {
        let log = test_logger();
        let coll = MemoryCollection::new("instances");
        let vpc = vpc_with_subnet();
        let mut inst = stored_instance(&coll, &vpc);
        let id = inst.id.unwrap();

        let mut disks = MockDiskStore::new();
        disks
            .expect_set_delete_protection()
            .with(eq(id), eq(true))
            .times(1)
            .returning(|_, _| Ok(()));
        let mut addresses = MockAddressAllocator::new();
        addresses.expect_release_instance_ip().never();
        addresses
            .expect_release_instance_addresses()
            .with(eq(id), eq(AddressClass::External))
            .times(1)
            .returning(|_, _| Ok(()));
        addresses
            .expect_release_instance_addresses()
            .with(eq(id), eq(AddressClass::Host))
            .times(1)
            .returning(|_, _| Ok(()));
        let svc = CommitServices {
            log: &log,
            instances: &coll,
            disks: &disks,
            addresses: &addresses,
        };

        let before = inst.pre_commit();
        inst.delete_protection = true;
        inst.no_public_address = true;
        inst.no_host_address = true;
        inst.commit(&coll).unwrap();
        let outcome = inst.post_commit(&before, &svc).unwrap();
        assert!(outcome.disks_changed);

        // Committing the same values again is not a transition.
        let before = inst.pre_commit();
        inst.commit(&coll).unwrap();
        let outcome = inst.post_commit(&before, &svc).unwrap();
        assert!(!outcome.disks_changed);
    }

    #[test]
    fn clearing_suppression_releases_nothing() {
        let log = test_logger();
        let coll = MemoryCollection::new("instances");
        let vpc = vpc_with_subnet();
        let mut inst = stored_instance(&coll, &vpc);
        inst.no_public_address = true;
        inst.no_host_address = true;
        inst.commit(&coll).unwrap();
        let (disks, addresses) = quiet_collaborators();
        let svc = CommitServices {
            log: &log,
            instances: &coll,
            disks: &disks,
            addresses: &addresses,
        };

        let before = inst.pre_commit();
        inst.no_public_address = false;
        inst.no_host_address = false;
        inst.commit(&coll).unwrap();
        inst.post_commit(&before, &svc).unwrap();
    }

    #[test]
    fn failed_side_effect_stops_the_rest() {
        let log = test_logger();
        let coll = MemoryCollection::new("instances");
        let vpc = vpc_with_subnet();
        let mut inst = stored_instance(&coll, &vpc);

        let mut disks = MockDiskStore::new();
        disks.expect_set_delete_protection().times(1).returning(|_, _| {
            Err(crate::store::StoreError::Backend("timeout".to_string()))
        });
        let mut addresses = MockAddressAllocator::new();
        addresses.expect_release_instance_addresses().never();
        let svc = CommitServices {
            log: &log,
            instances: &coll,
            disks: &disks,
            addresses: &addresses,
        };

        let before = inst.pre_commit();
        inst.delete_protection = true;
        inst.no_public_address = true;
        inst.commit(&coll).unwrap();
        let err = inst.post_commit(&before, &svc).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn invalid_update_is_not_persisted() {
        let log = test_logger();
        let coll = MemoryCollection::new("instances");
        let vpc = vpc_with_subnet();
        let mut inst = stored_instance(&coll, &vpc);
        let (disks, addresses) = quiet_collaborators();
        let svc = CommitServices {
            log: &log,
            instances: &coll,
            disks: &disks,
            addresses: &addresses,
        };

        let err = inst
            .update(&svc, &MockVpcLookup::new(), None, |i| {
                i.image = None;
                i.delete_protection = true;
            })
            .unwrap_err();
        assert!(err.validation().is_some());
        let stored = Instance::get(&coll, inst.id.unwrap()).unwrap();
        assert!(stored.image.is_some());
        assert!(!stored.delete_protection);
    }

    #[test]
    fn commit_requires_known_fields_and_an_id() {
        let coll = MemoryCollection::new("instances");
        let vpc = vpc_with_subnet();
        let inst = stored_instance(&coll, &vpc);
        assert!(matches!(
            inst.commit_fields(&coll, &["memory", "colour"]),
            Err(Error::Invariant(_))
        ));

        let unsaved = Instance::default();
        assert!(matches!(unsaved.commit(&coll), Err(Error::Invariant(_))));
    }
}
