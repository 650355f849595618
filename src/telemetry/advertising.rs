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

//! Legacy advertising payloads: flags, service UUID and as much of the name
//! as fits, with the complete name moved to the scan response when needed.

use heapless::Vec;
use uuid::Uuid;

pub const MAX_ADVERTISING_DATA: usize = 31;

const AD_FLAGS: u8 = 0x01;
const AD_COMPLETE_128_BIT_SERVICES: u8 = 0x07;
const AD_SHORTENED_LOCAL_NAME: u8 = 0x08;
const AD_COMPLETE_LOCAL_NAME: u8 = 0x09;
const FLAGS_GENERAL_DISCOVERABLE_NO_BR_EDR: u8 = 0x06;
const AD_HEADER_SIZE: usize = 2;

pub type AdvertisingData = Vec<u8, MAX_ADVERTISING_DATA>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisingError {
    /// Field does not fit in the remaining payload space
    PayloadTooLarge,
}

/// UUID bytes in the little-endian order used on air.
pub fn uuid_le_bytes(uuid: &Uuid) -> [u8; 16] {
    let mut bytes = *uuid.as_bytes();
    bytes.reverse();
    bytes
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingPayload {
    pub advertising_data: AdvertisingData,
    pub scan_response: AdvertisingData,
}

impl AdvertisingPayload {
    pub fn new(name: &str, service: &Uuid) -> Result<Self, AdvertisingError> {
        let mut advertising_data = AdvertisingData::new();
        let mut scan_response = AdvertisingData::new();

        push_field(&mut advertising_data, AD_FLAGS, &[FLAGS_GENERAL_DISCOVERABLE_NO_BR_EDR])?;
        push_field(&mut advertising_data, AD_COMPLETE_128_BIT_SERVICES, &uuid_le_bytes(service))?;

        let room = MAX_ADVERTISING_DATA.saturating_sub(advertising_data.len() + AD_HEADER_SIZE);
        if name.len() <= room {
            push_field(&mut advertising_data, AD_COMPLETE_LOCAL_NAME, name.as_bytes())?;
        } else {
            let mut cut = room;
            while !name.is_char_boundary(cut) {
                cut -= 1;
            }
            if cut > 0 {
                push_field(&mut advertising_data, AD_SHORTENED_LOCAL_NAME, &name.as_bytes()[..cut])?;
            }
            push_field(&mut scan_response, AD_COMPLETE_LOCAL_NAME, name.as_bytes())?;
        }

        Ok(Self {
            advertising_data,
            scan_response,
        })
    }
}

fn push_field(data: &mut AdvertisingData, ad_type: u8, value: &[u8]) -> Result<(), AdvertisingError> {
    if data.len() + AD_HEADER_SIZE + value.len() > MAX_ADVERTISING_DATA {
        return Err(AdvertisingError::PayloadTooLarge);
    }
    data.push(value.len() as u8 + 1)
        .and_then(|_| data.push(ad_type))
        .map_err(|_| AdvertisingError::PayloadTooLarge)?;
    data.extend_from_slice(value)
        .map_err(|_| AdvertisingError::PayloadTooLarge)
}
