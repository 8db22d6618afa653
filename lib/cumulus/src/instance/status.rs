// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Human-readable status projection.

use chrono::{DateTime, Utc};
use cumulus_types::{InstanceState, MacAddr, VmState};
use serde::Serialize;

use super::Instance;
use crate::vm;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, strum::Display)]
pub enum Status {
    #[strum(serialize = "Restart Required")]
    #[serde(rename = "Restart Required")]
    RestartRequired,
    Starting,
    Running,
    Updating,
    Provisioning,
    Stopping,
    Stopped,
    Failed,
    Restarting,
    Destroying,
}

/// Projects the lifecycle state and the hypervisor's report onto the status
/// shown to users. `None` means the hypervisor has not reported anything.
pub fn status(
    state: InstanceState,
    vm_state: Option<VmState>,
    restart: bool,
    restart_block_ip: bool,
) -> Status {
    use VmState::*;

    match state {
        InstanceState::Start if restart || restart_block_ip => {
            Status::RestartRequired
        }
        InstanceState::Start => match vm_state {
            Some(Running) => Status::Running,
            Some(Updating) => Status::Updating,
            Some(Provisioning) => Status::Provisioning,
            Some(Starting) | Some(Stopped) | Some(Failed) | None => {
                Status::Starting
            }
        },
        InstanceState::Cleanup => match vm_state {
            Some(Updating) => Status::Updating,
            _ => Status::Stopping,
        },
        InstanceState::Stop => match vm_state {
            Some(Starting) | Some(Running) => Status::Stopping,
            Some(Stopped) | Some(Provisioning) | None => Status::Stopped,
            Some(Failed) => Status::Failed,
            Some(Updating) => Status::Updating,
        },
        InstanceState::Restart => Status::Restarting,
        InstanceState::Destroy => Status::Destroying,
    }
}

/// Formats the time since `started`, largest unit first, omitting units
/// that are zero. Empty when the VM has no recorded start.
pub fn uptime(started: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(started) = started else {
        return String::new();
    };

    let secs = (now - started).num_seconds().max(0);
    let parts = [
        (secs / 86_400, "day", "days"),
        (secs % 86_400 / 3_600, "hour", "hours"),
        (secs % 3_600 / 60, "min", "mins"),
        (secs % 60, "sec", "secs"),
    ];
    let out = parts
        .iter()
        .filter(|(n, _, _)| *n > 0)
        .map(|(n, one, many)| {
            format!("{n} {}", if *n == 1 { one } else { many })
        })
        .collect::<Vec<_>>()
        .join(" ");

    if out.is_empty() {
        "0 secs".to_string()
    } else {
        out
    }
}

/// What a user sees of an instance, computed on demand and never stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InstanceView {
    pub status: Status,
    pub uptime: String,
    pub public_mac: Option<MacAddr>,
}

impl Instance {
    pub fn view(&self, now: DateTime<Utc>) -> InstanceView {
        InstanceView {
            status: status(
                self.state,
                self.vm_state,
                self.restart,
                self.restart_block_ip,
            ),
            uptime: uptime(self.vm_timestamp, now),
            public_mac: self
                .id
                .zip(self.vpc)
                .map(|(id, vpc)| vm::external_mac(id, vpc)),
        }
    }
}
