// Copyright (C) 2025 Paul Hampson
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License version 3 as  published by the
// Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <https://www.gnu.org/licenses/>.

//! GATT side of the device: one service with a notify-only data
//! characteristic and a writable control characteristic.
//!
//! The radio stack itself sits behind [`RadioLink`]; the peripheral state
//! machine in [`peripheral`] is driven by [`LinkEvent`]s from that stack.

pub mod advertising;
pub mod handler;
pub mod peripheral;

use crate::config::TelemetryConfig;
use advertising::AdvertisingPayload;
use uuid::Uuid;

pub type ConnHandle = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicProperties {
    pub notify: bool,
    pub write: bool,
    pub write_without_response: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub uuid: Uuid,
    pub data: Characteristic,
    pub control: Characteristic,
}

impl ServiceDefinition {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            uuid: config.service_uuid,
            data: Characteristic {
                uuid: config.data_uuid,
                properties: CharacteristicProperties {
                    notify: true,
                    write: false,
                    write_without_response: false,
                },
            },
            control: Characteristic {
                uuid: config.control_uuid,
                properties: CharacteristicProperties {
                    notify: false,
                    write: true,
                    write_without_response: true,
                },
            },
        }
    }
}

/// What the radio stack reports to the peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent<'a> {
    Connected(ConnHandle),
    Disconnected(ConnHandle),
    /// A central wrote to the control characteristic
    ControlWrite { conn: ConnHandle, value: &'a [u8] },
}

/// Operations the peripheral needs from the radio stack.
pub trait RadioLink {
    type Error: core::fmt::Debug;

    fn register_service(&mut self, service: &ServiceDefinition) -> Result<(), Self::Error>;

    fn start_advertising(&mut self, payload: &AdvertisingPayload) -> Result<(), Self::Error>;

    /// Sends `data` as a notification on the data characteristic.
    fn notify(&mut self, conn: ConnHandle, data: &[u8]) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_accepts_both_write_kinds() {
        let service = ServiceDefinition::new(&TelemetryConfig::default());
        assert!(service.data.properties.notify);
        assert!(!service.data.properties.write);
        assert!(service.control.properties.write);
        assert!(service.control.properties.write_without_response);
        assert_eq!(service.control.uuid, crate::config::CONTROL_UUID);
    }
}
