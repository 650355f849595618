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

//! Turns a raw [`AdcFrontEnd`] into a [`StrainGauge`] with error accounting.
//!
//! Every failed read bumps a consecutive error counter. Once it reaches the
//! configured maximum the next read resets the converter before trying again.

use super::interface::{sign_extend_24, AcquisitionError, AdcFrontEnd, RawSample, INVALID_FRAME};
use super::StrainGauge;
use crate::config::AdcConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverState {
    Normal,
    /// Recent reads failed but the limit has not been hit
    Degraded,
    /// A reset is in progress or is due before the next read
    Resetting,
}

pub struct LoadCellAdc<F> {
    front_end: F,
    error_count: u8,
    max_errors: u8,
    state: DriverState,
}

impl<F> LoadCellAdc<F>
where
    F: AdcFrontEnd,
{
    pub fn new(front_end: F, config: AdcConfig) -> Self {
        Self {
            front_end,
            error_count: 0,
            max_errors: config.max_errors.max(1),
            state: DriverState::Normal,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn error_count(&self) -> u8 {
        self.error_count
    }

    pub fn max_errors(&self) -> u8 {
        self.max_errors
    }

    /// Access to driver specific settings such as gain.
    pub fn front_end_mut(&mut self) -> &mut F {
        &mut self.front_end
    }

    async fn acquire(&mut self) -> Result<RawSample, AcquisitionError> {
        self.front_end.wait_ready().await?;
        let word = self.front_end.transfer_word().await?;
        if word == INVALID_FRAME {
            return Err(AcquisitionError::InvalidFrame);
        }
        Ok(sign_extend_24(word))
    }

    fn record_failure(&mut self, error: AcquisitionError) {
        self.error_count = self.error_count.saturating_add(1).min(self.max_errors);
        self.state = if self.error_count >= self.max_errors {
            DriverState::Resetting
        } else {
            DriverState::Degraded
        };
        debug!("Load cell read failed ({:?}), {} consecutive errors", error, self.error_count);
    }

    async fn recover(&mut self) -> Result<(), AcquisitionError> {
        self.state = DriverState::Resetting;
        match self.front_end.reset().await {
            Ok(()) => {
                self.error_count = 0;
                self.state = DriverState::Normal;
                info!("Load cell ADC recovered");
                Ok(())
            }
            Err(e) => {
                error!("Load cell ADC reset failed: {:?}", e);
                self.error_count = self.max_errors;
                Err(AcquisitionError::BusNotResponding)
            }
        }
    }
}

impl<F> StrainGauge for LoadCellAdc<F>
where
    F: AdcFrontEnd,
{
    async fn initialize(&mut self) -> Result<(), AcquisitionError> {
        self.front_end.initialize().await
    }

    async fn read(&mut self) -> Result<RawSample, AcquisitionError> {
        if self.error_count >= self.max_errors {
            warn!("{} consecutive read failures, resetting load cell ADC", self.error_count);
            self.recover().await?;
        }

        match self.acquire().await {
            Ok(sample) => {
                self.error_count = 0;
                self.state = DriverState::Normal;
                Ok(sample)
            }
            Err(e) => {
                self.record_failure(e);
                Err(e)
            }
        }
    }

    async fn reset(&mut self) -> Result<(), AcquisitionError> {
        self.recover().await
    }

    async fn power_down(&mut self) -> Result<(), AcquisitionError> {
        self.front_end.power_down().await
    }

    async fn power_up(&mut self) -> Result<(), AcquisitionError> {
        self.front_end.power_up().await
    }
}
