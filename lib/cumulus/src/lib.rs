// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The instance reconciliation core of the cumulus control plane.
//!
//! Instances are validated and persisted through [`instance`], turned into
//! hypervisor run specifications and diffed against running VMs in [`vm`],
//! and the work of applying those diffs is claimed fleet-wide through
//! [`job`] and planned in [`reconcile`]. Everything that talks to shared state does so through the
//! collaborator traits in [`store`], [`vpc`], [`disk`] and [`address`];
//! [`memory`] provides in-process implementations of them.

pub mod address;
pub mod disk;
pub mod error;
pub mod instance;
pub mod job;
pub mod memory;
pub mod node;
pub mod reconcile;
pub mod store;
pub mod usb;
pub mod vm;
pub mod vpc;

pub use error::{Error, ValidationCode, ValidationError};
pub use instance::Instance;
pub use job::Job;
