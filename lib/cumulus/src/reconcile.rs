// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planning what the hypervisor must do for one instance, under a job
//! reservation.
//!
//! Every reconciliation pass claims its own job per instance, so a pass
//! that finished does not stop the next one from running. Once a job is
//! reserved it always ends `Finished` or `Failed` unless the process dies.

use chrono::{DateTime, Utc};
use slog::{error, info, warn};
use uuid::Uuid;

use crate::disk::DiskStore;
use crate::error::Error;
use crate::instance::Instance;
use crate::job::Job;
use crate::node::NodeProfile;
use crate::store::Collection;
use crate::vm::{self, DiskChanges, SpecBuilderError, VirtualMachineSpec};

/// Name of the job that applies an instance's run spec to the hypervisor.
pub const RECONCILE_JOB: &str = "instance_reconcile";

/// What must happen on the hypervisor to bring a VM in line with its
/// instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Plan {
    /// No VM is running; create one from this spec.
    Create(VirtualMachineSpec),
    /// A VM is running. `reconfigure` is set when it must be reconfigured
    /// or restarted; `disks` are the mounts to change either way.
    Update { reconfigure: bool, disks: DiskChanges },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reconciled {
    /// Another node holds this pass's job for the instance.
    Contended,
    /// The run spec could not be built. The job was marked failed.
    Unbuildable(SpecBuilderError),
    /// The job finished with this plan.
    Planned(Plan),
}

/// Identifies the work of one pass over one instance.
pub fn work_key(instance: Uuid, pass: DateTime<Utc>) -> String {
    format!("{instance}-{}", pass.timestamp_millis())
}

/// Reserves the job for `inst` in the pass started at `pass`, then plans
/// the change from `running` to its desired run spec.
///
/// An error after the reservation marks the job failed before it is
/// returned.
pub fn plan_instance(
    log: &slog::Logger,
    jobs: &dyn Collection,
    disks: &dyn DiskStore,
    node: &NodeProfile,
    inst: &Instance,
    running: Option<&VirtualMachineSpec>,
    pass: DateTime<Utc>,
) -> Result<Reconciled, Error> {
    let id = inst.require_id()?;
    let mut job = Job::new(RECONCILE_JOB, &work_key(id, pass), node.id, pass);
    if !job.reserve(log, jobs)? {
        return Ok(Reconciled::Contended);
    }

    let planned = match plan(inst, id, disks, node, running) {
        Ok(planned) => planned,
        Err(e) => {
            abandon(log, &mut job, jobs);
            return Err(e);
        }
    };

    match planned {
        Ok(plan) => {
            if let Err(e) = job.finished(log, jobs) {
                abandon(log, &mut job, jobs);
                return Err(e);
            }
            info!(log, "planned instance"; "instance" => %id,
                  "job" => &job.id);
            Ok(Reconciled::Planned(plan))
        }
        Err(e) => {
            error!(log, "cannot build run spec"; "instance" => %id,
                   "error" => %e);
            job.failed(log, jobs)?;
            Ok(Reconciled::Unbuildable(e))
        }
    }
}

fn plan(
    inst: &Instance,
    id: Uuid,
    disks: &dyn DiskStore,
    node: &NodeProfile,
    running: Option<&VirtualMachineSpec>,
) -> Result<Result<Plan, SpecBuilderError>, Error> {
    let attached = disks.instance_disks(id)?;
    let desired = match vm::build_spec(inst, &attached, node) {
        Ok(spec) => spec,
        Err(e) => return Ok(Err(e)),
    };

    Ok(Ok(match running {
        None => Plan::Create(desired),
        Some(current) => Plan::Update {
            reconfigure: desired.changed(current),
            disks: desired.disk_changes(current),
        },
    }))
}

/// Marks a reserved job failed after an error. The error that caused it is
/// the one reported, so a failure here is only logged.
fn abandon(log: &slog::Logger, job: &mut Job, jobs: &dyn Collection) {
    if let Err(e) = job.failed(log, jobs) {
        warn!(log, "could not mark job failed"; "job" => &job.id,
              "error" => %e);
    }
}
