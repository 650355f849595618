#![no_std]
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

//! Bit-exact payloads exchanged over the strength monitor GATT service.
//!
//! Commands arrive on the control characteristic as `opcode [payload..]`.
//! Notifications leave on the data characteristic as `kind [body..]`, all
//! multi-byte fields little-endian.

pub mod command;
pub mod response;

pub use command::{Command, CommandError, CommandOpcode};
pub use response::{
    encode_battery_level, encode_low_battery, encode_weight_batch, weight_batch_len, Notification,
    ResponseKind, WeightSample, WeightSamples,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// The buffer is too small to hold the encoded message, value is the expected length
    BufferTooSmall(usize),
    /// The first byte of a notification is not a known response kind
    UnknownResponseKind(u8),
    /// The message ends before the fields its header announces
    Truncated,
    /// A weight batch can carry at most 255 samples
    TooManySamples,
}
