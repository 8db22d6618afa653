// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};

/// A USB device requested for passthrough, identified by vendor and product.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbDevice {
    /// Display name cached from the last hardware scan. Never persisted as
    /// authoritative; validation clears it.
    #[serde(default)]
    pub name: String,
    pub vendor: String,
    pub product: String,
}

const USB_ID_LEN: usize = 4;

/// Normalizes a USB vendor or product id to four lowercase hex digits.
/// Returns an empty string if `id` is not such an id.
pub fn filter_id(id: &str) -> String {
    let id = id.trim().to_ascii_lowercase();
    if id.len() != USB_ID_LEN || !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return String::new();
    }
    id
}
