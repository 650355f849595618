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

pub mod filter;
pub mod interface;
pub mod load_cell;
pub mod simulation;
pub mod weight;

use embassy_time::{Duration, Timer};
use filter::LowPassFilter;
use heapless::Vec;
use interface::{AcquisitionError, RawSample};
use micromath::statistics::Mean;

/// Largest sample count a single average will take
pub const MAX_AVERAGE_SAMPLES: usize = 32;
const AVERAGE_RETRY_PAUSE: Duration = Duration::from_millis(50);

/// Source of raw load cell conversions.
pub trait StrainGauge {
    async fn initialize(&mut self) -> Result<(), AcquisitionError>;

    async fn read(&mut self) -> Result<RawSample, AcquisitionError>;

    async fn reset(&mut self) -> Result<(), AcquisitionError>;

    async fn power_down(&mut self) -> Result<(), AcquisitionError>;

    async fn power_up(&mut self) -> Result<(), AcquisitionError>;

    /// Mean of `times` successful reads, giving up after `2 * times` attempts.
    /// Fails with the last read error only if no read succeeded.
    async fn read_average(&mut self, times: usize) -> Result<f32, AcquisitionError> {
        let times = times.clamp(1, MAX_AVERAGE_SAMPLES);
        let mut readings = Vec::<f32, MAX_AVERAGE_SAMPLES>::new();
        let mut last_error = AcquisitionError::NoTrigger;

        for _ in 0..times * 2 {
            if readings.len() >= times {
                break;
            }
            match self.read().await {
                Ok(reading) => {
                    if readings.push(reading as f32).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Read failed while averaging: {:?}", e);
                    last_error = e;
                    Timer::after(AVERAGE_RETRY_PAUSE).await;
                }
            }
        }

        if readings.is_empty() {
            warn!("No successful reads out of {} attempts", times * 2);
            return Err(last_error);
        }
        if readings.len() < times {
            warn!("Average built from {} of {} reads", readings.len(), times);
        }
        Ok(readings.into_iter().mean())
    }

    /// Feeds one read through `filter`. A failed read leaves the filter
    /// untouched and returns its last output.
    async fn read_low_pass(&mut self, filter: &mut LowPassFilter) -> f32 {
        match self.read().await {
            Ok(reading) => filter.update(reading as f32),
            Err(e) => {
                debug!("Filtered read failed: {:?}", e);
                filter.value()
            }
        }
    }
}
