// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Errors returned by the core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// Machine-readable reasons an instance specification was rejected.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValidationCode {
    InvalidState,
    OrganizationRequired,
    ZoneRequired,
    NodeRequired,
    ImageRequired,
    VpcRequired,
    VpcSubnetRequired,
    VpcSubnetMissing,
    InitDiskSizeInvalid,
    UsbDeviceInvalid,
}

impl ValidationCode {
    fn message(&self) -> &'static str {
        match self {
            ValidationCode::InvalidState => "Invalid instance state",
            ValidationCode::OrganizationRequired => {
                "Missing required organization"
            }
            ValidationCode::ZoneRequired => "Missing required zone",
            ValidationCode::NodeRequired => "Missing required node",
            ValidationCode::ImageRequired => "Missing required image",
            ValidationCode::VpcRequired => "Missing required VPC",
            ValidationCode::VpcSubnetRequired => "Missing required VPC subnet",
            ValidationCode::VpcSubnetMissing => "VPC subnet does not exist",
            ValidationCode::InitDiskSizeInvalid => "Disk size below minimum",
            ValidationCode::UsbDeviceInvalid => "Invalid USB device",
        }
    }
}

/// A user-facing rejection of an instance specification. These are never
/// retried and are meant to be shown to the requester as-is.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ValidationError {
    #[serde(rename = "error")]
    pub code: ValidationCode,
    pub message: String,
}

impl From<ValidationCode> for ValidationError {
    fn from(code: ValidationCode) -> Self {
        Self { code, message: code.message().to_string() }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },

    #[error("{kind} {id} already exists")]
    DuplicateKey { kind: String, id: String },

    #[error("storage failure")]
    Storage(#[source] StoreError),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    /// Returns the validation failure carried by this error, if it is one.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Error::Validation(e) => Some(e),
            _ => None,
        }
    }

    /// Whether a caller may reasonably retry the operation that produced
    /// this error. Only transport and storage failures qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { collection, id } => {
                Error::NotFound { kind: collection, id }
            }
            StoreError::DuplicateKey { collection, id } => {
                Error::DuplicateKey { kind: collection, id }
            }
            e => Error::Storage(e),
        }
    }
}

impl From<ValidationCode> for Error {
    fn from(code: ValidationCode) -> Self {
        Error::Validation(code.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Storage(StoreError::Serialization(e))
    }
}
