// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fleet-wide job reservations.
//!
//! A job is a claim on one unit of work. Its id encodes the work item, so
//! every node that races to perform the same work tries to insert the same
//! id; the store's uniqueness constraint lets exactly one of them win. There
//! is no lease or heartbeat: a node that dies while holding a reservation
//! leaves the job `Reserved` until the retention window purges it, and that
//! id is never retried.

use std::time::Duration;

use chrono::{DateTime, Utc};
use cumulus_types::JobState;
use serde::{Deserialize, Serialize};
use slog::{debug, info, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::store::{self, Collection, Document, StoreError};

/// Timestamp field used to age out job records.
const TIMESTAMP_FIELD: &str = "timestamp";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub state: JobState,
    #[serde(default)]
    pub retry: bool,
    /// The node that reserved the job.
    pub node: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl Job {
    /// Creates a reservation request for the work item identified by
    /// `work_key`. Nodes that call this with the same `name` and `work_key`
    /// contend for the same job.
    pub fn new(
        name: &str,
        work_key: &str,
        node: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("{name}-{work_key}"),
            name: name.to_string(),
            state: JobState::Reserved,
            retry: false,
            node,
            timestamp: now,
        }
    }

    /// Attempts to claim this job. Returns `Ok(true)` if this caller now owns
    /// the work and `Ok(false)` if another caller already reserved it.
    pub fn reserve(
        &self,
        log: &slog::Logger,
        coll: &dyn Collection,
    ) -> Result<bool, Error> {
        match coll.insert(Some(&self.id), store::to_document(self)?) {
            Ok(_) => {
                info!(log, "reserved job"; "job" => &self.id,
                      "node" => %self.node);
                Ok(true)
            }
            Err(StoreError::DuplicateKey { .. }) => {
                debug!(log, "job already reserved elsewhere";
                       "job" => &self.id);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Marks a reserved job as failed.
    pub fn failed(
        &mut self,
        log: &slog::Logger,
        coll: &dyn Collection,
    ) -> Result<(), Error> {
        self.set_state(log, coll, JobState::Failed)
    }

    /// Marks a reserved job as finished.
    pub fn finished(
        &mut self,
        log: &slog::Logger,
        coll: &dyn Collection,
    ) -> Result<(), Error> {
        self.set_state(log, coll, JobState::Finished)
    }

    // The stored state is not read back first; repeating the same terminal
    // transition simply rewrites it.
    fn set_state(
        &mut self,
        log: &slog::Logger,
        coll: &dyn Collection,
        state: JobState,
    ) -> Result<(), Error> {
        if self.state.is_terminal() && self.state != state {
            return Err(Error::Invariant(format!(
                "job {} is already {} and cannot become {}",
                self.id, self.state, state
            )));
        }

        let mut fields = Document::new();
        fields.insert("state".to_string(), serde_json::to_value(state)?);
        coll.update_fields(&self.id, fields)?;
        self.state = state;

        info!(log, "job state updated"; "job" => &self.id,
              "state" => %state);
        Ok(())
    }
}

/// Removes jobs reserved longer than `retention` ago, whatever their state.
/// A window reaching back past the earliest representable time purges
/// nothing.
pub fn purge_expired(
    log: &slog::Logger,
    coll: &dyn Collection,
    now: DateTime<Utc>,
    retention: Duration,
) -> Result<usize, Error> {
    let cutoff = chrono::Duration::from_std(retention)
        .ok()
        .and_then(|retention| now.checked_sub_signed(retention));
    let Some(cutoff) = cutoff else {
        debug!(log, "job retention exceeds the calendar; nothing purged";
               "retention" => ?retention);
        return Ok(0);
    };

    let removed = coll.remove_older_than(TIMESTAMP_FIELD, cutoff)?;
    if removed > 0 {
        warn!(log, "purged expired jobs"; "count" => removed);
    }
    Ok(removed)
}
