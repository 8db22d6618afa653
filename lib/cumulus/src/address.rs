// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The address bookkeeping contract used when an instance's networking
//! changes underneath it.

use cumulus_types::AddressClass;
use uuid::Uuid;

use crate::store::StoreError;

#[cfg_attr(test, mockall::automock)]
pub trait AddressAllocator: Send + Sync {
    /// Releases the instance's private address inside `vpc`.
    fn release_instance_ip(
        &self,
        instance: Uuid,
        vpc: Uuid,
    ) -> Result<(), StoreError>;

    /// Releases every address of the given class held by the instance.
    fn release_instance_addresses(
        &self,
        instance: Uuid,
        class: AddressClass,
    ) -> Result<(), StoreError>;
}
