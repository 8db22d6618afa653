// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Normalization and validation of a desired instance specification.

use cumulus_types::InstanceState;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

use super::Instance;
use crate::error::{Error, ValidationCode};
use crate::usb;
use crate::vpc::VpcLookup;

pub const MIN_MEMORY_MB: u32 = 256;
pub const MIN_PROCESSORS: u32 = 1;
pub const MIN_INIT_DISK_SIZE: u32 = 10;

/// VNC display ports are drawn from `[VNC_DISPLAY_BASE, VNC_DISPLAY_BASE +
/// VNC_DISPLAY_SPAN)`. Nothing checks for collisions with other instances on
/// the same node.
pub const VNC_DISPLAY_BASE: u32 = 4101;
pub const VNC_DISPLAY_SPAN: u32 = 9998;
const VNC_PASSWORD_LEN: usize = 32;

impl Instance {
    /// Validates this instance and normalizes it in place.
    ///
    /// A specification the requester must fix is reported as
    /// [`Error::Validation`]; every other error means a lookup failed (a
    /// missing VPC surfaces as [`Error::NotFound`]).
    pub fn validate(&mut self, vpcs: &dyn VpcLookup) -> Result<(), Error> {
        if self.state != InstanceState::Start {
            self.restart = false;
            self.restart_block_ip = false;
        }

        if self.organization.is_none() {
            return Err(ValidationCode::OrganizationRequired.into());
        }
        if self.zone.is_none() {
            return Err(ValidationCode::ZoneRequired.into());
        }
        if self.node.is_none() {
            return Err(ValidationCode::NodeRequired.into());
        }
        if self.image.is_none() {
            return Err(ValidationCode::ImageRequired.into());
        }
        let Some(vpc_id) = self.vpc else {
            return Err(ValidationCode::VpcRequired.into());
        };
        let Some(subnet_id) = self.subnet else {
            return Err(ValidationCode::VpcSubnetRequired.into());
        };

        let vpc = vpcs.get_vpc(vpc_id)?;
        if vpc.get_subnet(subnet_id).is_none() {
            return Err(ValidationCode::VpcSubnetMissing.into());
        }

        if self.init_disk_size != 0 && self.init_disk_size < MIN_INIT_DISK_SIZE
        {
            return Err(ValidationCode::InitDiskSizeInvalid.into());
        }

        self.memory = self.memory.max(MIN_MEMORY_MB);
        self.processors = self.processors.max(MIN_PROCESSORS);

        for device in self.usb_devices.iter_mut() {
            device.name.clear();
            device.vendor = usb::filter_id(&device.vendor);
            device.product = usb::filter_id(&device.product);
            if device.vendor.is_empty() || device.product.is_empty() {
                return Err(ValidationCode::UsbDeviceInvalid.into());
            }
        }

        if self.vnc {
            if self.vnc_display == 0 {
                self.vnc_display = rand::thread_rng().gen_range(
                    VNC_DISPLAY_BASE..VNC_DISPLAY_BASE + VNC_DISPLAY_SPAN,
                );
            }
            if self.vnc_password.is_empty() {
                self.vnc_password = OsRng
                    .sample_iter(&Alphanumeric)
                    .take(VNC_PASSWORD_LEN)
                    .map(char::from)
                    .collect();
            }
        } else {
            self.vnc_password.clear();
        }

        Ok(())
    }
}
