// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only lookups of virtual networks and their subnets.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{self, Collection, StoreError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    /// The subnet's address range in CIDR notation.
    pub network: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vpc {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
}

impl Vpc {
    pub fn get_subnet(&self, id: Uuid) -> Option<&Subnet> {
        self.subnets.iter().find(|s| s.id == id)
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait VpcLookup: Send + Sync {
    /// Fetches a VPC, failing with [`StoreError::NotFound`] if there is no
    /// such VPC.
    fn get_vpc(&self, id: Uuid) -> Result<Vpc, StoreError>;
}

/// VPC lookups served from a document collection.
pub struct StoredVpcs<'a> {
    coll: &'a dyn Collection,
}

impl<'a> StoredVpcs<'a> {
    pub fn new(coll: &'a dyn Collection) -> Self {
        Self { coll }
    }

    pub fn insert(&self, vpc: &Vpc) -> Result<(), StoreError> {
        let id = vpc.id.to_string();
        self.coll.insert(Some(&id), store::to_document(vpc)?)?;
        Ok(())
    }
}

impl VpcLookup for StoredVpcs<'_> {
    fn get_vpc(&self, id: Uuid) -> Result<Vpc, StoreError> {
        store::from_document(self.coll.find(&id.to_string())?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::memory::MemoryCollection;

    #[test]
    fn stored_vpcs_round_trip() {
        let coll = MemoryCollection::new("vpcs");
        let vpcs = StoredVpcs::new(&coll);
        let subnet = Subnet {
            id: Uuid::new_v4(),
            name: "primary".to_string(),
            network: "10.97.0.0/24".to_string(),
        };
        let vpc = Vpc {
            id: Uuid::new_v4(),
            name: "vpc".to_string(),
            subnets: vec![subnet.clone()],
        };
        vpcs.insert(&vpc).unwrap();

        let found = vpcs.get_vpc(vpc.id).unwrap();
        assert_eq!(found, vpc);
        assert_eq!(found.get_subnet(subnet.id), Some(&subnet));
        assert!(found.get_subnet(Uuid::new_v4()).is_none());

        assert!(matches!(
            vpcs.get_vpc(Uuid::new_v4()),
            Err(StoreError::NotFound { .. })
        ));
    }
}
