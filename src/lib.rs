#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]
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

//! Load cell acquisition and wireless telemetry core of a portable strength
//! monitor.
//!
//! [`weight`] reads an HX711 or NAU7802 and turns raw counts into filtered,
//! tared kilograms. [`telemetry`] exposes those readings over a GATT style
//! service, and [`application`] ties the two together in the main loop.

#[macro_use]
mod fmt;

pub mod application;
pub mod config;
pub mod telemetry;
pub mod weight;

#[cfg(test)]
mod testing;
