// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process implementations of the storage and address collaborators.
//!
//! These back the standalone driver and the test suites. They honor the same
//! contracts a real document store must: atomic unique-id inserts, distinct
//! not-found and duplicate-key errors, and field-level updates.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use cumulus_types::AddressClass;
use uuid::Uuid;

use crate::address::AddressAllocator;
use crate::store::{Collection, Document, StoreError, ID_FIELD};

pub struct MemoryCollection {
    name: String,
    docs: Mutex<BTreeMap<String, Document>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), docs: Mutex::new(BTreeMap::new()) }
    }

    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn not_found(&self, id: &str) -> StoreError {
        StoreError::NotFound {
            collection: self.name.clone(),
            id: id.to_string(),
        }
    }
}

impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert(
        &self,
        id: Option<&str>,
        mut doc: Document,
    ) -> Result<String, StoreError> {
        let id = match id {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        let mut docs = self.docs.lock().unwrap();
        if docs.contains_key(&id) {
            return Err(StoreError::DuplicateKey {
                collection: self.name.clone(),
                id,
            });
        }

        doc.insert(ID_FIELD.to_string(), id.clone().into());
        docs.insert(id.clone(), doc);
        Ok(id)
    }

    fn find(&self, id: &str) -> Result<Document, StoreError> {
        self.docs
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| self.not_found(id))
    }

    fn replace(&self, id: &str, mut doc: Document) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().unwrap();
        let existing = docs.get_mut(id).ok_or_else(|| self.not_found(id))?;
        doc.insert(ID_FIELD.to_string(), id.into());
        *existing = doc;
        Ok(())
    }

    fn update_fields(
        &self,
        id: &str,
        fields: Document,
    ) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().unwrap();
        let existing = docs.get_mut(id).ok_or_else(|| self.not_found(id))?;
        for (key, value) in fields {
            if key != ID_FIELD {
                existing.insert(key, value);
            }
        }
        Ok(())
    }

    fn remove_older_than(
        &self,
        field: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut docs = self.docs.lock().unwrap();
        let before = docs.len();
        docs.retain(|_, doc| {
            let stamp = doc.get(field).cloned().and_then(|v| {
                serde_json::from_value::<DateTime<Utc>>(v).ok()
            });
            match stamp {
                Some(stamp) => stamp >= cutoff,
                None => true,
            }
        });
        Ok(before - docs.len())
    }

    fn ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.docs.lock().unwrap().keys().cloned().collect())
    }
}

/// Where an address lease was allocated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaseScope {
    /// A private address inside a VPC.
    Vpc(Uuid),
    /// An address from one of the node's address blocks.
    Block(AddressClass),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressLease {
    pub instance: Uuid,
    pub scope: LeaseScope,
    pub address: String,
}

/// Address leases held in memory. Releasing removes every matching lease;
/// releasing something that is not leased is not an error.
#[derive(Default)]
pub struct MemoryAddresses {
    leases: Mutex<Vec<AddressLease>>,
}

impl MemoryAddresses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lease(&self, lease: AddressLease) {
        self.leases.lock().unwrap().push(lease);
    }

    pub fn leases(&self) -> Vec<AddressLease> {
        self.leases.lock().unwrap().clone()
    }

    fn release_where(&self, pred: impl Fn(&AddressLease) -> bool) {
        self.leases.lock().unwrap().retain(|l| !pred(l));
    }
}

impl AddressAllocator for MemoryAddresses {
    fn release_instance_ip(
        &self,
        instance: Uuid,
        vpc: Uuid,
    ) -> Result<(), StoreError> {
        self.release_where(|l| {
            l.instance == instance && l.scope == LeaseScope::Vpc(vpc)
        });
        Ok(())
    }

    fn release_instance_addresses(
        &self,
        instance: Uuid,
        class: AddressClass,
    ) -> Result<(), StoreError> {
        self.release_where(|l| {
            l.instance == instance && l.scope == LeaseScope::Block(class)
        });
        Ok(())
    }
}
