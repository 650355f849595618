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

use crate::FrameError;
use strum::FromRepr;

/// Offset of the one byte length field in a calibrate command.
pub const CALIBRATE_LENGTH_OFFSET: usize = 1;
/// Offset of the little-endian f32 known mass (kg) in a calibrate command.
pub const CALIBRATE_WEIGHT_OFFSET: usize = 2;
/// Shortest calibrate command accepted: opcode, length, f32.
pub const CALIBRATE_MIN_LEN: usize = CALIBRATE_WEIGHT_OFFSET + size_of::<f32>();

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CommandOpcode {
    Tare = 0x64,
    StartMeasurement = 0x65,
    StopMeasurement = 0x66,
    Calibrate = 0x67,
    Shutdown = 0x6E,
    BatteryQuery = 0x6F,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command<'a> {
    Tare,
    StartMeasurement,
    StopMeasurement,
    Calibrate { known_weight_kg: f32 },
    Shutdown,
    BatteryQuery,
    /// Opcode outside the known set, handed on with the bytes that follow it
    Unknown { opcode: u8, payload: &'a [u8] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// A write with no opcode byte
    Empty,
    /// The opcode needs a longer payload than was written
    Truncated {
        opcode: u8,
        expected: usize,
        actual: usize,
    },
}

impl<'a> Command<'a> {
    /// Decode a value written to the control characteristic.
    ///
    /// # Errors
    ///
    /// - `Empty`: the write carried no bytes
    /// - `Truncated`: a calibrate command shorter than [`CALIBRATE_MIN_LEN`]
    pub fn decode(value: &'a [u8]) -> Result<Self, CommandError> {
        let (&opcode, payload) = value.split_first().ok_or(CommandError::Empty)?;

        let Some(known) = CommandOpcode::from_repr(opcode) else {
            return Ok(Command::Unknown { opcode, payload });
        };

        let command = match known {
            CommandOpcode::Tare => Command::Tare,
            CommandOpcode::StartMeasurement => Command::StartMeasurement,
            CommandOpcode::StopMeasurement => Command::StopMeasurement,
            CommandOpcode::Shutdown => Command::Shutdown,
            CommandOpcode::BatteryQuery => Command::BatteryQuery,
            CommandOpcode::Calibrate => {
                if value.len() < CALIBRATE_MIN_LEN {
                    return Err(CommandError::Truncated {
                        opcode,
                        expected: CALIBRATE_MIN_LEN,
                        actual: value.len(),
                    });
                }
                let mut weight_bytes = [0u8; size_of::<f32>()];
                weight_bytes.copy_from_slice(&value[CALIBRATE_WEIGHT_OFFSET..CALIBRATE_MIN_LEN]);
                Command::Calibrate {
                    known_weight_kg: f32::from_le_bytes(weight_bytes),
                }
            }
        };
        Ok(command)
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Command::Tare => CommandOpcode::Tare as u8,
            Command::StartMeasurement => CommandOpcode::StartMeasurement as u8,
            Command::StopMeasurement => CommandOpcode::StopMeasurement as u8,
            Command::Calibrate { .. } => CommandOpcode::Calibrate as u8,
            Command::Shutdown => CommandOpcode::Shutdown as u8,
            Command::BatteryQuery => CommandOpcode::BatteryQuery as u8,
            Command::Unknown { opcode, .. } => *opcode,
        }
    }

    /// Encode the command as a client would write it. Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// - `BufferTooSmall`: if the buffer cannot hold the whole command
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, FrameError> {
        let needed = match self {
            Command::Calibrate { .. } => CALIBRATE_MIN_LEN,
            Command::Unknown { payload, .. } => 1 + payload.len(),
            _ => 1,
        };
        if buffer.len() < needed {
            return Err(FrameError::BufferTooSmall(needed));
        }

        buffer[0] = self.opcode();
        match self {
            Command::Calibrate { known_weight_kg } => {
                buffer[CALIBRATE_LENGTH_OFFSET] = size_of::<f32>() as u8;
                buffer[CALIBRATE_WEIGHT_OFFSET..CALIBRATE_MIN_LEN]
                    .copy_from_slice(&known_weight_kg.to_le_bytes());
            }
            Command::Unknown { payload, .. } => {
                buffer[1..needed].copy_from_slice(payload);
            }
            _ => {}
        }
        Ok(needed)
    }
}
