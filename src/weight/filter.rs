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

use crate::config::DEFAULT_TIME_CONSTANT;

/// First order exponential smoothing of raw readings.
///
/// The first sample seeds the output directly so the filter does not ramp
/// up from zero after power on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowPassFilter {
    time_constant: f32,
    filtered: f32,
    primed: bool,
}

impl LowPassFilter {
    /// Out of range time constants fall back to the default.
    pub fn new(time_constant: f32) -> Self {
        let time_constant = if Self::is_valid(time_constant) {
            time_constant
        } else {
            DEFAULT_TIME_CONSTANT
        };
        Self {
            time_constant,
            filtered: 0.0,
            primed: false,
        }
    }

    fn is_valid(time_constant: f32) -> bool {
        time_constant > 0.0 && time_constant < 1.0
    }

    pub fn update(&mut self, sample: f32) -> f32 {
        if self.primed {
            self.filtered += self.time_constant * (sample - self.filtered);
        } else {
            self.filtered = sample;
            self.primed = true;
        }
        self.filtered
    }

    pub fn value(&self) -> f32 {
        self.filtered
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    pub fn time_constant(&self) -> f32 {
        self.time_constant
    }

    /// Returns false and keeps the current constant unless `0 < time_constant < 1`.
    pub fn set_time_constant(&mut self, time_constant: f32) -> bool {
        if !Self::is_valid(time_constant) {
            return false;
        }
        self.time_constant = time_constant;
        true
    }

    pub fn reset(&mut self) {
        self.filtered = 0.0;
        self.primed = false;
    }
}
