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

//! NAU7802 24 bit bridge ADC on I2C.

use super::{AcquisitionError, AdcFrontEnd};
use crate::config::Nau7802Config;
use embassy_time::{Duration, Timer};
use strum::FromRepr;

pub const NAU7802_I2C_ADDRESS: u8 = 0x2A;

mod register {
    pub const PU_CTRL: u8 = 0x00;
    pub const CTRL1: u8 = 0x01;
    pub const CTRL2: u8 = 0x02;
    pub const ADCO_B2: u8 = 0x12;
    pub const ADC: u8 = 0x15;
    pub const PGA: u8 = 0x1B;
    pub const POWER: u8 = 0x1C;
    pub const REVISION_ID: u8 = 0x1F;
}

mod pu_ctrl {
    pub const RR: u8 = 0;
    pub const PUD: u8 = 1;
    pub const PUA: u8 = 2;
    pub const PUR: u8 = 3;
    pub const CS: u8 = 4;
    pub const CR: u8 = 5;
    pub const AVDDS: u8 = 7;
}

mod ctrl2 {
    pub const CALS: u8 = 2;
    pub const CAL_ERR: u8 = 3;
}

const LDO_3V3: u8 = 0b100;
const REVISION_MASK: u8 = 0x0F;
const CLK_CHP_OFF: u8 = 0b11;
const PGA_LDOMODE: u8 = 6;
const POWER_PGA_CAP_EN: u8 = 7;

const RESET_HOLD: Duration = Duration::from_millis(10);
const DIGITAL_POWER_UP: Duration = Duration::from_millis(1);
const CALIBRATION_POLL_INTERVAL: Duration = Duration::from_millis(10);
const CALIBRATION_POLLS: usize = 100;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Nau7802Gain {
    X1 = 0,
    X2 = 1,
    X4 = 2,
    X8 = 3,
    X16 = 4,
    X32 = 5,
    X64 = 6,
    X128 = 7,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Nau7802Rate {
    Sps10 = 0,
    Sps20 = 1,
    Sps40 = 2,
    Sps80 = 3,
    Sps320 = 7,
}

pub struct Nau7802<I2C> {
    i2c: I2C,
    config: Nau7802Config,
}

impl<I2C> Nau7802<I2C>
where
    I2C: embedded_hal_async::i2c::I2c,
{
    pub fn new(i2c: I2C, config: Nau7802Config) -> Self {
        Self { i2c, config }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    pub fn bus_mut(&mut self) -> &mut I2C {
        &mut self.i2c
    }

    async fn read_register(&mut self, register: u8) -> Result<u8, AcquisitionError> {
        let mut value = [0u8];
        self.i2c
            .write_read(self.config.address, &[register], &mut value)
            .await
            .map_err(|_| AcquisitionError::Bus)?;
        Ok(value[0])
    }

    async fn write_register(&mut self, register: u8, value: u8) -> Result<(), AcquisitionError> {
        self.i2c
            .write(self.config.address, &[register, value])
            .await
            .map_err(|_| AcquisitionError::Bus)
    }

    async fn read_bit(&mut self, register: u8, bit: u8) -> Result<bool, AcquisitionError> {
        Ok(self.read_register(register).await? & (1 << bit) != 0)
    }

    async fn write_bit(&mut self, register: u8, bit: u8, set: bool) -> Result<(), AcquisitionError> {
        self.write_field(register, bit, 1, u8::from(set)).await
    }

    async fn write_field(&mut self, register: u8, shift: u8, width: u8, value: u8) -> Result<(), AcquisitionError> {
        let mask = ((1u8 << width) - 1) << shift;
        let current = self.read_register(register).await?;
        self.write_register(register, (current & !mask) | ((value << shift) & mask))
            .await
    }

    pub async fn gain(&mut self) -> Result<Option<Nau7802Gain>, AcquisitionError> {
        Ok(Nau7802Gain::from_repr(self.read_register(register::CTRL1).await? & 0b111))
    }

    pub async fn set_gain(&mut self, gain: Nau7802Gain) -> Result<(), AcquisitionError> {
        self.config.gain = gain;
        self.write_field(register::CTRL1, 0, 3, gain as u8).await
    }

    pub async fn rate(&mut self) -> Result<Option<Nau7802Rate>, AcquisitionError> {
        Ok(Nau7802Rate::from_repr((self.read_register(register::CTRL2).await? >> 4) & 0b111))
    }

    pub async fn set_rate(&mut self, rate: Nau7802Rate) -> Result<(), AcquisitionError> {
        self.config.rate = rate;
        self.write_field(register::CTRL2, 4, 3, rate as u8).await
    }

    /// Register reset followed by digital power up. Returns whether the
    /// power-up-ready flag came back.
    async fn soft_reset(&mut self) -> Result<bool, AcquisitionError> {
        self.write_bit(register::PU_CTRL, pu_ctrl::RR, true).await?;
        Timer::after(RESET_HOLD).await;
        self.write_bit(register::PU_CTRL, pu_ctrl::RR, false).await?;
        self.write_bit(register::PU_CTRL, pu_ctrl::PUD, true).await?;
        Timer::after(DIGITAL_POWER_UP).await;
        self.read_bit(register::PU_CTRL, pu_ctrl::PUR).await
    }

    async fn enable(&mut self) -> Result<bool, AcquisitionError> {
        self.write_bit(register::PU_CTRL, pu_ctrl::PUD, true).await?;
        self.write_bit(register::PU_CTRL, pu_ctrl::PUA, true).await?;
        Timer::after(self.config.power_up_settle).await;
        self.write_bit(register::PU_CTRL, pu_ctrl::CS, true).await?;
        self.read_bit(register::PU_CTRL, pu_ctrl::PUR).await
    }

    async fn configure(&mut self) -> Result<(), AcquisitionError> {
        self.write_bit(register::PU_CTRL, pu_ctrl::AVDDS, true).await?;
        self.write_field(register::CTRL1, 3, 3, LDO_3V3).await?;
        self.set_gain(self.config.gain).await?;
        self.set_rate(self.config.rate).await?;
        self.write_field(register::ADC, 4, 2, CLK_CHP_OFF).await?;
        self.write_bit(register::PGA, PGA_LDOMODE, false).await?;
        self.write_bit(register::POWER, POWER_PGA_CAP_EN, true).await
    }

    /// Runs the internal offset calibration. `Ok(false)` means the chip
    /// flagged a calibration error or never finished.
    pub async fn calibrate_offset(&mut self) -> Result<bool, AcquisitionError> {
        self.write_field(register::CTRL2, 0, 2, 0).await?;
        self.write_bit(register::CTRL2, ctrl2::CALS, true).await?;
        for _ in 0..CALIBRATION_POLLS {
            let status = self.read_register(register::CTRL2).await?;
            if status & (1 << ctrl2::CALS) == 0 {
                return Ok(status & (1 << ctrl2::CAL_ERR) == 0);
            }
            Timer::after(CALIBRATION_POLL_INTERVAL).await;
        }
        Ok(false)
    }

    async fn bring_up(&mut self) -> Result<(), AcquisitionError> {
        if !self.soft_reset().await? {
            error!("NAU7802 did not power up after register reset");
            return Err(AcquisitionError::BusNotResponding);
        }
        if !self.enable().await? {
            error!("NAU7802 did not report power ready");
            return Err(AcquisitionError::BusNotResponding);
        }
        self.configure().await
    }
}

impl<I2C> AdcFrontEnd for Nau7802<I2C>
where
    I2C: embedded_hal_async::i2c::I2c,
{
    async fn initialize(&mut self) -> Result<(), AcquisitionError> {
        self.bring_up().await?;

        let revision = self.read_register(register::REVISION_ID).await?;
        if revision & REVISION_MASK != REVISION_MASK {
            error!("Unexpected NAU7802 revision id {:#x}", revision);
            return Err(AcquisitionError::BusNotResponding);
        }

        if !self.calibrate_offset().await? {
            warn!("NAU7802 offset calibration failed");
        }
        info!("NAU7802 ready, revision {:#x}", revision);
        Ok(())
    }

    async fn wait_ready(&mut self) -> Result<(), AcquisitionError> {
        for _ in 0..self.config.ready_polls {
            if self.read_bit(register::PU_CTRL, pu_ctrl::CR).await? {
                return Ok(());
            }
            Timer::after(self.config.ready_poll_interval).await;
        }
        Err(AcquisitionError::PollTimeout)
    }

    async fn transfer_word(&mut self) -> Result<u32, AcquisitionError> {
        let mut word = [0u8; 3];
        self.i2c
            .write_read(self.config.address, &[register::ADCO_B2], &mut word)
            .await
            .map_err(|_| AcquisitionError::Bus)?;
        Ok(u32::from_be_bytes([0, word[0], word[1], word[2]]))
    }

    async fn reset(&mut self) -> Result<(), AcquisitionError> {
        warn!("Resetting NAU7802");
        self.bring_up().await.map_err(|e| {
            error!("NAU7802 reset failed: {:?}", e);
            AcquisitionError::BusNotResponding
        })
    }

    async fn power_down(&mut self) -> Result<(), AcquisitionError> {
        self.write_bit(register::PU_CTRL, pu_ctrl::PUA, false).await?;
        self.write_bit(register::PU_CTRL, pu_ctrl::PUD, false).await
    }

    async fn power_up(&mut self) -> Result<(), AcquisitionError> {
        if self.enable().await? {
            Ok(())
        } else {
            Err(AcquisitionError::BusNotResponding)
        }
    }
}
