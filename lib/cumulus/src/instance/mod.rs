// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The instance record: the desired state of one virtual machine.
//!
//! An instance is created by validating it and inserting it into the
//! instances collection, which assigns its id. After that it only changes
//! through the commit protocol in [`commit`]: snapshot the fields that side
//! effects compare against, apply the new values, persist them (whole or as
//! a named subset of fields), then run the post-commit side effects. An
//! instance is never deleted here; it is moved to
//! [`InstanceState::Destroy`] and something else tears it down.

use chrono::{DateTime, Utc};
use cumulus_types::{InstanceState, VmState};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{Error, ValidationCode, ValidationError};
use crate::store::{self, Collection};
use crate::usb::UsbDevice;

pub mod commit;
pub mod status;
pub mod validate;

pub use commit::{CommitServices, CommitSnapshot, PostCommitOutcome};
pub use status::{InstanceView, Status};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Instance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub organization: Option<Uuid>,
    pub zone: Option<Uuid>,
    pub node: Option<Uuid>,
    pub image: Option<Uuid>,
    pub vpc: Option<Uuid>,
    pub subnet: Option<Uuid>,

    #[serde(deserialize_with = "state_or_default")]
    pub state: InstanceState,
    /// What the hypervisor last reported; `None` until it reports anything.
    #[serde(deserialize_with = "vm_state_or_none")]
    pub vm_state: Option<VmState>,
    /// When the VM last started.
    pub vm_timestamp: Option<DateTime<Utc>>,

    pub restart: bool,
    pub restart_block_ip: bool,
    pub delete_protection: bool,

    #[serde(deserialize_with = "null_as_default")]
    pub public_ips: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub public_ips6: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub private_ips: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub private_ips6: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub host_ips: Vec<String>,
    pub network_namespace: String,
    pub no_public_address: bool,
    pub no_host_address: bool,

    pub name: String,
    pub comment: String,
    /// Requested size of the initial disk, zero when unset.
    pub init_disk_size: u32,
    /// Memory in MB.
    pub memory: u32,
    pub processors: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub network_roles: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub usb_devices: Vec<UsbDevice>,

    pub vnc: bool,
    pub vnc_password: String,
    /// VNC display port, zero when unassigned.
    pub vnc_display: u32,
}

/// Records written before a state was chosen carry an empty string, which
/// means the initial state.
fn state_or_default<'de, D>(deserializer: D) -> Result<InstanceState, D::Error>
where
    D: Deserializer<'de>,
{
    let name = Option::<String>::deserialize(deserializer)?;
    match name.as_deref() {
        None | Some("") => Ok(InstanceState::default()),
        Some(name) => name.parse().map_err(serde::de::Error::custom),
    }
}

/// An empty string is written while the hypervisor has not reported a
/// state yet.
fn vm_state_or_none<'de, D>(
    deserializer: D,
) -> Result<Option<VmState>, D::Error>
where
    D: Deserializer<'de>,
{
    let name = Option::<String>::deserialize(deserializer)?;
    match name.as_deref() {
        None | Some("") => Ok(None),
        Some(name) => {
            name.parse().map(Some).map_err(serde::de::Error::custom)
        }
    }
}

/// Lists stored as `null` read as empty.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parses a state name supplied by a requester.
pub fn parse_requested_state(
    name: &str,
) -> Result<InstanceState, ValidationError> {
    if name.is_empty() {
        return Ok(InstanceState::default());
    }
    name.parse().map_err(|_| ValidationCode::InvalidState.into())
}

impl Instance {
    /// Whether the instance wants to run or its VM is still up.
    pub fn is_active(&self) -> bool {
        self.state == InstanceState::Start
            || matches!(
                self.vm_state,
                Some(VmState::Running)
                    | Some(VmState::Starting)
                    | Some(VmState::Provisioning)
            )
    }

    pub fn get(coll: &dyn Collection, id: Uuid) -> Result<Self, Error> {
        Ok(store::from_document(coll.find(&id.to_string())?)?)
    }

    /// Inserts a new instance, letting the store assign its id.
    pub fn insert(&mut self, coll: &dyn Collection) -> Result<Uuid, Error> {
        if let Some(id) = self.id {
            return Err(Error::Invariant(format!(
                "instance {id} already exists"
            )));
        }

        let id = coll.insert(None, store::to_document(self)?)?;
        let id = id.parse::<Uuid>().map_err(|e| {
            Error::Invariant(format!("store assigned malformed id {id}: {e}"))
        })?;
        self.id = Some(id);
        Ok(id)
    }

    pub(crate) fn require_id(&self) -> Result<Uuid, Error> {
        self.id.ok_or_else(|| {
            Error::Invariant("instance has not been inserted".to_string())
        })
    }
}
