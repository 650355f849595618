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

//! Synthetic load used when no load cell answers at start up.

use core::f32::consts::PI;
use embassy_time::{Duration, Instant};
#[cfg(not(test))]
use micromath::F32Ext;

const BASE_KG: f32 = 10.0;
const SWING_KG: f32 = 5.0;
const RIPPLE_KG: f32 = 0.2;
const PERIOD: Duration = Duration::from_secs(4);

/// Slow sine around a fixed base with a faster ripple on top, never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedLoad {
    origin: Instant,
}

impl SimulatedLoad {
    pub fn new(origin: Instant) -> Self {
        Self { origin }
    }

    pub fn weight_at(&self, now: Instant) -> f32 {
        let elapsed_us = now
            .checked_duration_since(self.origin)
            .map(|elapsed| elapsed.as_micros())
            .unwrap_or(0);
        let period_us = PERIOD.as_micros();
        let phase = 2.0 * PI * (elapsed_us % period_us) as f32 / period_us as f32;

        let weight = BASE_KG + SWING_KG * phase.sin() + RIPPLE_KG * (7.0 * phase).sin();
        weight.max(0.0)
    }
}
