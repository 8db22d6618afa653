// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Disks attached to instances.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{self, Collection, Document, StoreError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    /// The instance this disk is attached to, if any.
    #[serde(default)]
    pub instance: Option<Uuid>,
    /// Attachment position on the instance. Stored as text; entries that do
    /// not parse as an integer are ignored when building a VM spec.
    #[serde(default)]
    pub index: String,
    #[serde(default)]
    pub delete_protection: bool,
}

#[cfg_attr(test, mockall::automock)]
pub trait DiskStore: Send + Sync {
    /// Sets the delete protection flag on every disk owned by `instance`.
    fn set_delete_protection(
        &self,
        instance: Uuid,
        protect: bool,
    ) -> Result<(), StoreError>;

    /// Lists the disks attached to `instance`.
    fn instance_disks(&self, instance: Uuid) -> Result<Vec<Disk>, StoreError>;
}

/// Disk records kept in a document collection.
pub struct StoredDisks<'a> {
    coll: &'a dyn Collection,
}

impl<'a> StoredDisks<'a> {
    pub fn new(coll: &'a dyn Collection) -> Self {
        Self { coll }
    }

    pub fn insert(&self, disk: &Disk) -> Result<(), StoreError> {
        let id = disk.id.to_string();
        self.coll.insert(Some(&id), store::to_document(disk)?)?;
        Ok(())
    }

    fn all(&self) -> Result<Vec<Disk>, StoreError> {
        let mut disks = Vec::new();
        for id in self.coll.ids()? {
            disks.push(store::from_document(self.coll.find(&id)?)?);
        }
        Ok(disks)
    }
}

impl DiskStore for StoredDisks<'_> {
    fn set_delete_protection(
        &self,
        instance: Uuid,
        protect: bool,
    ) -> Result<(), StoreError> {
        for disk in self.instance_disks(instance)? {
            let mut fields = Document::new();
            fields.insert("delete_protection".to_string(), protect.into());
            self.coll.update_fields(&disk.id.to_string(), fields)?;
        }
        Ok(())
    }

    fn instance_disks(&self, instance: Uuid) -> Result<Vec<Disk>, StoreError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|d| d.instance == Some(instance))
            .collect())
    }
}
