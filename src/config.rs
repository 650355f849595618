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

//! Compile-time defaults and the runtime configuration handed to each component.
//!
//! Sample rate and scale factor differ between hardware builds, so both are
//! configuration rather than constants baked into the drivers.

use crate::weight::interface::hx711::{Hx711Gain, TriggerMode};
use crate::weight::interface::nau7802::{Nau7802Gain, Nau7802Rate, NAU7802_I2C_ADDRESS};
use embassy_time::Duration;
use uuid::{uuid, Uuid};

pub const DEVICE_NAME: &str = "PicoStrength";
pub const SERVICE_UUID: Uuid = uuid!("7e4e1701-1ea6-40c9-9dcc-13d34ffead57");
pub const DATA_UUID: Uuid = uuid!("7e4e1702-1ea6-40c9-9dcc-13d34ffead57");
pub const CONTROL_UUID: Uuid = uuid!("7e4e1703-1ea6-40c9-9dcc-13d34ffead57");

pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 80;
pub const DEFAULT_MAX_ERRORS: u8 = 10;
pub const DEFAULT_TIME_CONSTANT: f32 = 0.25;
/// Raw counts per kilogram until the device has been calibrated.
pub const DEFAULT_SCALE: f32 = 1.0;
pub const DEFAULT_BATCH_SIZE: usize = 4;
pub const MAX_BATCH_SIZE: usize = 16;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(25);
pub const MAX_CONNECTIONS: usize = 4;
pub const DEFAULT_LOW_BATTERY_MV: u32 = 3300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcConfig {
    /// Consecutive failed reads tolerated before the front end is reset
    pub max_errors: u8,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            max_errors: DEFAULT_MAX_ERRORS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hx711Config {
    pub gain: Hx711Gain,
    pub trigger: TriggerMode,
    /// Time budget for the busy poll on the data line, converted to a loop
    /// count when the driver is initialised
    pub trigger_budget: Duration,
    /// Upper bound on waiting for the data-ready edge in [`TriggerMode::Edge`]
    pub edge_timeout: Duration,
}

impl Default for Hx711Config {
    fn default() -> Self {
        Self {
            gain: Hx711Gain::Gain128,
            trigger: TriggerMode::Polling,
            trigger_budget: Duration::from_secs(1),
            edge_timeout: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nau7802Config {
    pub address: u8,
    pub gain: Nau7802Gain,
    pub rate: Nau7802Rate,
    /// Analog supply settling time after power up
    pub power_up_settle: Duration,
    pub ready_poll_interval: Duration,
    pub ready_polls: u32,
}

impl Default for Nau7802Config {
    fn default() -> Self {
        Self {
            address: NAU7802_I2C_ADDRESS,
            gain: Nau7802Gain::X128,
            rate: Nau7802Rate::Sps80,
            power_up_settle: Duration::from_millis(600),
            ready_poll_interval: Duration::from_millis(1),
            ready_polls: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleConfig {
    pub tare_samples: usize,
    pub calibration_samples: usize,
    /// Raw counts per kilogram used before the first calibration
    pub default_scale: f32,
    /// Known masses at or below this are refused by calibration
    pub min_known_weight_kg: f32,
    /// Calibrated scales smaller than this (counts per kg) indicate a dead sensor
    pub min_scale_magnitude: f32,
    pub time_constant: f32,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            tare_samples: 15,
            calibration_samples: 10,
            default_scale: DEFAULT_SCALE,
            min_known_weight_kg: 0.001,
            min_scale_magnitude: 1.0,
            time_constant: DEFAULT_TIME_CONSTANT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub device_name: &'static str,
    pub service_uuid: Uuid,
    pub data_uuid: Uuid,
    pub control_uuid: Uuid,
    /// Samples per notification, at most [`MAX_BATCH_SIZE`]
    pub batch_size: usize,
    /// Longest time a sample waits in the batch
    pub flush_interval: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            device_name: DEVICE_NAME,
            service_uuid: SERVICE_UUID,
            data_uuid: DATA_UUID,
            control_uuid: CONTROL_UUID,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub sample_rate_hz: u32,
    pub low_battery_mv: u32,
}

impl MonitorConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.sample_rate_hz.max(1)))
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            low_battery_mv: DEFAULT_LOW_BATTERY_MV,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_interval_follows_rate() {
        let config = MonitorConfig {
            sample_rate_hz: 200,
            ..Default::default()
        };
        assert_eq!(config.sample_interval(), Duration::from_millis(5));

        let stalled = MonitorConfig {
            sample_rate_hz: 0,
            ..Default::default()
        };
        assert_eq!(stalled.sample_interval(), Duration::from_secs(1));
    }
}
