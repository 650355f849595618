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

use super::filter::LowPassFilter;
use super::interface::AcquisitionError;
use super::simulation::SimulatedLoad;
use super::StrainGauge;
use crate::config::ScaleConfig;
use embassy_time::Instant;
#[cfg(not(test))]
use micromath::F32Ext;

const RAW_AVERAGE_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScaleError {
    Acquisition(AcquisitionError),
    InvalidKnownWeight,
    DegenerateScale,
    SimulationMode,
}

impl From<AcquisitionError> for ScaleError {
    fn from(e: AcquisitionError) -> Self {
        ScaleError::Acquisition(e)
    }
}

/// Tare offset in raw counts and scale in counts per kilogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationState {
    offset: f32,
    scale: f32,
}

impl CalibrationState {
    /// `None` when the scale is zero or not finite.
    pub fn new(offset: f32, scale: f32) -> Option<Self> {
        if scale == 0.0 || !scale.is_finite() || !offset.is_finite() {
            return None;
        }
        Some(Self { offset, scale })
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Kilograms for a raw reading, clamped at zero.
    pub fn to_weight(&self, raw: f32) -> f32 {
        let weight = (raw - self.offset) / self.scale;
        if weight > 0.0 { weight } else { 0.0 }
    }
}

enum Source<G> {
    Hardware(G),
    Simulated(SimulatedLoad),
}

pub struct WeightScale<G> {
    source: Source<G>,
    calibration: CalibrationState,
    filter: LowPassFilter,
    config: ScaleConfig,
}

impl<G> WeightScale<G>
where
    G: StrainGauge,
{
    /// Brings up the gauge and takes one self test reading to seed the filter.
    /// If either step fails the scale runs on simulated data instead.
    pub async fn new(mut strain_gauge: G, config: ScaleConfig) -> Self {
        let self_test = match strain_gauge.initialize().await {
            Ok(()) => strain_gauge.read().await,
            Err(e) => Err(e),
        };

        match self_test {
            Ok(reading) => {
                info!("Load cell self test reading {}", reading);
                let mut scale = Self::with_source(Source::Hardware(strain_gauge), config);
                scale.filter.update(reading as f32);
                scale
            }
            Err(e) => {
                error!("Load cell not responding ({:?}), using simulated data", e);
                Self::simulated(config)
            }
        }
    }

    pub fn simulated(config: ScaleConfig) -> Self {
        Self::with_source(Source::Simulated(SimulatedLoad::new(Instant::now())), config)
    }

    fn with_source(source: Source<G>, config: ScaleConfig) -> Self {
        let scale = if config.default_scale != 0.0 && config.default_scale.is_finite() {
            config.default_scale
        } else {
            1.0
        };
        Self {
            source,
            calibration: CalibrationState { offset: 0.0, scale },
            filter: LowPassFilter::new(config.time_constant),
            config,
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self.source, Source::Simulated(_))
    }

    pub fn calibration(&self) -> CalibrationState {
        self.calibration
    }

    /// Restores a previously stored calibration.
    pub fn set_calibration(&mut self, calibration: CalibrationState) {
        self.calibration = calibration;
    }

    pub fn set_time_constant(&mut self, time_constant: f32) -> bool {
        self.filter.set_time_constant(time_constant)
    }

    /// Averages the unloaded reading into the tare offset. On failure the
    /// gauge is reset once and the average retried; the old offset is kept
    /// if that fails as well.
    pub async fn tare(&mut self) -> Result<(), ScaleError> {
        let samples = self.config.tare_samples;
        let strain_gauge = match &mut self.source {
            Source::Hardware(strain_gauge) => strain_gauge,
            Source::Simulated(_) => {
                info!("Tare ignored in simulation mode");
                return Ok(());
            }
        };

        let offset = match strain_gauge.read_average(samples).await {
            Ok(offset) => offset,
            Err(e) => {
                warn!("Tare failed ({:?}), resetting load cell and retrying", e);
                strain_gauge.reset().await?;
                strain_gauge.read_average(samples).await?
            }
        };

        self.calibration.offset = offset;
        info!("Tare offset = {}", offset);
        Ok(())
    }

    pub async fn calibrate(&mut self, known_weight_kg: f32) -> Result<(), ScaleError> {
        let samples = self.config.calibration_samples;
        let strain_gauge = match &mut self.source {
            Source::Hardware(strain_gauge) => strain_gauge,
            Source::Simulated(_) => {
                warn!("Cannot calibrate in simulation mode");
                return Err(ScaleError::SimulationMode);
            }
        };

        if known_weight_kg.is_nan() || known_weight_kg <= self.config.min_known_weight_kg {
            warn!("Refusing calibration against {} kg", known_weight_kg);
            return Err(ScaleError::InvalidKnownWeight);
        }

        let reading = strain_gauge.read_average(samples).await?;
        let scale = (reading - self.calibration.offset) / known_weight_kg;
        if !scale.is_finite() || scale.abs() < self.config.min_scale_magnitude {
            warn!("Calibration produced unusable scale {}", scale);
            return Err(ScaleError::DegenerateScale);
        }

        self.calibration.scale = scale;
        info!("Calibration scale = {} counts per kg", scale);
        Ok(())
    }

    /// Filtered weight in kilograms, never negative. A failed read returns the
    /// weight of the last filtered value.
    pub async fn get_weight(&mut self) -> f32 {
        match &mut self.source {
            Source::Hardware(strain_gauge) => {
                let filtered = strain_gauge.read_low_pass(&mut self.filter).await;
                trace!("Filtered reading = {}", filtered);
                self.calibration.to_weight(filtered)
            }
            Source::Simulated(load) => load.weight_at(Instant::now()),
        }
    }

    /// Unfiltered, untared average for diagnostics.
    pub async fn raw_reading(&mut self) -> Result<f32, ScaleError> {
        match &mut self.source {
            Source::Hardware(strain_gauge) => Ok(strain_gauge.read_average(RAW_AVERAGE_SAMPLES).await?),
            Source::Simulated(_) => Err(ScaleError::SimulationMode),
        }
    }

    pub async fn power_down(&mut self) -> Result<(), ScaleError> {
        if let Source::Hardware(strain_gauge) = &mut self.source {
            strain_gauge.power_down().await?;
        }
        Ok(())
    }

    pub async fn power_up(&mut self) -> Result<(), ScaleError> {
        if let Source::Hardware(strain_gauge) = &mut self.source {
            strain_gauge.power_up().await?;
        }
        Ok(())
    }
}
