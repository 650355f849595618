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

//! Test doubles shared by the unit tests.

use crate::telemetry::advertising::AdvertisingPayload;
use crate::telemetry::{ConnHandle, RadioLink, ServiceDefinition};
use crate::weight::interface::{AcquisitionError, RawSample};
use crate::weight::StrainGauge;
use std::collections::VecDeque;
use std::vec::Vec;

/// Gauge that replays a fixed sequence of read results, failing with
/// `NoTrigger` once the script runs out.
pub(crate) struct ScriptedGauge {
    script: VecDeque<Result<RawSample, AcquisitionError>>,
    pub initialize_result: Result<(), AcquisitionError>,
    pub reset_result: Result<(), AcquisitionError>,
    pub reads: usize,
}

impl ScriptedGauge {
    pub fn new<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Result<RawSample, AcquisitionError>>,
    {
        Self {
            script: script.into_iter().collect(),
            initialize_result: Ok(()),
            reset_result: Ok(()),
            reads: 0,
        }
    }

    pub fn empty() -> Self {
        Self::new(core::iter::empty())
    }
}

impl StrainGauge for ScriptedGauge {
    async fn initialize(&mut self) -> Result<(), AcquisitionError> {
        self.initialize_result
    }

    async fn read(&mut self) -> Result<RawSample, AcquisitionError> {
        self.reads += 1;
        self.script.pop_front().unwrap_or(Err(AcquisitionError::NoTrigger))
    }

    async fn reset(&mut self) -> Result<(), AcquisitionError> {
        self.reset_result
    }

    async fn power_down(&mut self) -> Result<(), AcquisitionError> {
        Ok(())
    }

    async fn power_up(&mut self) -> Result<(), AcquisitionError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RadioRefused;

#[derive(Default)]
pub(crate) struct RecordingRadio {
    pub registered: Option<ServiceDefinition>,
    pub advertising_starts: usize,
    pub notifications: Vec<(ConnHandle, Vec<u8>)>,
    pub fail_registration: bool,
}

impl RadioLink for RecordingRadio {
    type Error = RadioRefused;

    fn register_service(&mut self, service: &ServiceDefinition) -> Result<(), RadioRefused> {
        if self.fail_registration {
            return Err(RadioRefused);
        }
        self.registered = Some(*service);
        Ok(())
    }

    fn start_advertising(&mut self, _payload: &AdvertisingPayload) -> Result<(), RadioRefused> {
        self.advertising_starts += 1;
        Ok(())
    }

    fn notify(&mut self, conn: ConnHandle, data: &[u8]) -> Result<(), RadioRefused> {
        self.notifications.push((conn, data.to_vec()));
        Ok(())
    }
}
