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
use core::slice::ChunksExact;
use strum::FromRepr;

pub const WEIGHT_HEADER_SIZE: usize = 2;
pub const WEIGHT_SAMPLE_SIZE: usize = 8;
pub const BATTERY_MESSAGE_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ResponseKind {
    Battery = 0x00,
    Weight = 0x01,
    LowBattery = 0x04,
}

/// One weight reading and its offset from the start of the measurement session.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WeightSample {
    pub weight_kg: f32,
    pub offset_us: i32,
}

impl WeightSample {
    pub fn new(weight_kg: f32, offset_us: i32) -> Self {
        Self {
            weight_kg,
            offset_us,
        }
    }

    fn write_to(&self, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.weight_kg.to_le_bytes());
        out[4..WEIGHT_SAMPLE_SIZE].copy_from_slice(&self.offset_us.to_le_bytes());
    }

    fn read_from(bytes: &[u8]) -> Self {
        let mut weight = [0u8; 4];
        let mut offset = [0u8; 4];
        weight.copy_from_slice(&bytes[..4]);
        offset.copy_from_slice(&bytes[4..WEIGHT_SAMPLE_SIZE]);
        Self {
            weight_kg: f32::from_le_bytes(weight),
            offset_us: i32::from_le_bytes(offset),
        }
    }
}

/// Size of a weight notification carrying `count` samples.
pub const fn weight_batch_len(count: usize) -> usize {
    WEIGHT_HEADER_SIZE + count * WEIGHT_SAMPLE_SIZE
}

/// Serialise a batch as `0x01, N, N x (f32 weight, i32 offset)`.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// - `TooManySamples`: more than 255 samples
/// - `BufferTooSmall`: the buffer cannot hold the header plus every sample
pub fn encode_weight_batch(samples: &[WeightSample], buffer: &mut [u8]) -> Result<usize, FrameError> {
    if samples.len() > u8::MAX as usize {
        return Err(FrameError::TooManySamples);
    }
    let total_bytes_needed = weight_batch_len(samples.len());
    if buffer.len() < total_bytes_needed {
        return Err(FrameError::BufferTooSmall(total_bytes_needed));
    }

    buffer[0] = ResponseKind::Weight as u8;
    buffer[1] = samples.len() as u8;
    let body = &mut buffer[WEIGHT_HEADER_SIZE..total_bytes_needed];
    for (sample, out) in samples.iter().zip(body.chunks_exact_mut(WEIGHT_SAMPLE_SIZE)) {
        sample.write_to(out);
    }

    Ok(total_bytes_needed)
}

pub fn encode_battery_level(millivolts: u32, buffer: &mut [u8]) -> Result<usize, FrameError> {
    encode_millivolts(ResponseKind::Battery, millivolts, buffer)
}

pub fn encode_low_battery(millivolts: u32, buffer: &mut [u8]) -> Result<usize, FrameError> {
    encode_millivolts(ResponseKind::LowBattery, millivolts, buffer)
}

fn encode_millivolts(kind: ResponseKind, millivolts: u32, buffer: &mut [u8]) -> Result<usize, FrameError> {
    if buffer.len() < BATTERY_MESSAGE_SIZE {
        return Err(FrameError::BufferTooSmall(BATTERY_MESSAGE_SIZE));
    }
    buffer[0] = kind as u8;
    buffer[1..BATTERY_MESSAGE_SIZE].copy_from_slice(&millivolts.to_le_bytes());
    Ok(BATTERY_MESSAGE_SIZE)
}

/// Samples of a received weight notification, decoded lazily.
#[derive(Debug, Clone)]
pub struct WeightSamples<'a> {
    chunks: ChunksExact<'a, u8>,
}

impl Iterator for WeightSamples<'_> {
    type Item = WeightSample;

    fn next(&mut self) -> Option<Self::Item> {
        self.chunks.next().map(WeightSample::read_from)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for WeightSamples<'_> {}

/// A notification as seen by the client side of the link.
#[derive(Debug, Clone)]
pub enum Notification<'a> {
    Battery { millivolts: u32 },
    LowBattery { millivolts: u32 },
    Weight(WeightSamples<'a>),
}

impl<'a> Notification<'a> {
    pub fn decode(buffer: &'a [u8]) -> Result<Self, FrameError> {
        let (&kind, body) = buffer.split_first().ok_or(FrameError::Truncated)?;
        let kind = ResponseKind::from_repr(kind).ok_or(FrameError::UnknownResponseKind(kind))?;

        match kind {
            ResponseKind::Battery => Ok(Notification::Battery {
                millivolts: read_millivolts(body)?,
            }),
            ResponseKind::LowBattery => Ok(Notification::LowBattery {
                millivolts: read_millivolts(body)?,
            }),
            ResponseKind::Weight => {
                let (&count, samples) = body.split_first().ok_or(FrameError::Truncated)?;
                let samples_len = count as usize * WEIGHT_SAMPLE_SIZE;
                if samples.len() < samples_len {
                    return Err(FrameError::Truncated);
                }
                Ok(Notification::Weight(WeightSamples {
                    chunks: samples[..samples_len].chunks_exact(WEIGHT_SAMPLE_SIZE),
                }))
            }
        }
    }
}

fn read_millivolts(body: &[u8]) -> Result<u32, FrameError> {
    let bytes = body.get(..4).ok_or(FrameError::Truncated)?;
    let mut millivolts = [0u8; 4];
    millivolts.copy_from_slice(bytes);
    Ok(u32::from_le_bytes(millivolts))
}
