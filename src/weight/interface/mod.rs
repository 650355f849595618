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

//! Low level access to the load cell ADC.
//!
//! A front end only knows how to move bits: wait for a conversion, clock the
//! word out, reset and power the converter. Error counting, sentinel checks and
//! sign extension live one level up in [`crate::weight::load_cell`].

pub mod hx711;
pub mod nau7802;

/// Signed 24 bit conversion result held in an `i32`
pub type RawSample = i32;

pub const RAW_SAMPLE_BITS: usize = 24;
pub const RAW_SAMPLE_MIN: RawSample = -(1 << 23);
pub const RAW_SAMPLE_MAX: RawSample = (1 << 23) - 1;

/// All-ones word clocked out when the converter is not actually driving the line
pub const INVALID_FRAME: u32 = 0x00FF_FFFF;

const WORD_MASK: u32 = (1 << RAW_SAMPLE_BITS) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquisitionError {
    /// Data line never signalled a conversion within the polling bound
    NoTrigger,
    /// Ready edge or ready flag did not arrive in time
    PollTimeout,
    /// Word read back was the all-ones sentinel
    InvalidFrame,
    /// Converter stopped answering, including after a reset
    BusNotResponding,
    /// Pin or I2C transfer failed
    Bus,
}

pub const fn sign_extend_24(word: u32) -> RawSample {
    let word = word & WORD_MASK;
    if word & (1 << (RAW_SAMPLE_BITS - 1)) != 0 {
        (word | !WORD_MASK) as i32
    } else {
        word as i32
    }
}

pub trait AdcFrontEnd {
    async fn initialize(&mut self) -> Result<(), AcquisitionError>;

    /// Returns once a conversion is ready to be clocked out.
    async fn wait_ready(&mut self) -> Result<(), AcquisitionError>;

    /// Clocks out the pending conversion as an unsigned 24 bit word.
    async fn transfer_word(&mut self) -> Result<u32, AcquisitionError>;

    async fn reset(&mut self) -> Result<(), AcquisitionError>;

    async fn power_down(&mut self) -> Result<(), AcquisitionError>;

    async fn power_up(&mut self) -> Result<(), AcquisitionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_extension_covers_full_range() {
        assert_eq!(sign_extend_24(0x000000), 0);
        assert_eq!(sign_extend_24(0x000001), 1);
        assert_eq!(sign_extend_24(0x7FFFFF), RAW_SAMPLE_MAX);
        assert_eq!(sign_extend_24(0x800000), RAW_SAMPLE_MIN);
        assert_eq!(sign_extend_24(0xFFFFFE), -2);
    }

    #[test]
    fn upper_byte_is_ignored() {
        assert_eq!(sign_extend_24(0xAB00_0010), 16);
        assert_eq!(sign_extend_24(0x0180_0000), RAW_SAMPLE_MIN);
    }

    #[test]
    fn every_sample_survives_the_wire_word() {
        let samples = (RAW_SAMPLE_MIN..=RAW_SAMPLE_MAX).step_by(97).chain([RAW_SAMPLE_MIN, -1, 0, RAW_SAMPLE_MAX]);
        for sample in samples {
            let word = sample as u32 & WORD_MASK;
            assert_eq!(sign_extend_24(word), sample, "word {:#x}", word);
            assert_eq!(sign_extend_24(word | 0x5A00_0000), sample);
        }
    }
}
