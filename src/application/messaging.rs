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

use crate::telemetry::handler::CommandHandler;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use strength_monitor_messages::CommandOpcode;

/// Work the peripheral asks of the task that owns the scale
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlRequest {
    Tare,
    Calibrate(f32),
    Shutdown,
    BatteryQuery,
}

const CHANNEL_DEPTH: usize = 8;

pub type ControlChannel<M> = Channel<M, ControlRequest, CHANNEL_DEPTH>;
pub type ControlSender<'a, M> = Sender<'a, M, ControlRequest, CHANNEL_DEPTH>;
pub type ControlReceiver<'a, M> = Receiver<'a, M, ControlRequest, CHANNEL_DEPTH>;

/// Turns peripheral callbacks into [`ControlRequest`]s so that tare and
/// calibration run outside the radio event handler.
pub struct CommandForwarder<'a, M: RawMutex> {
    sender: ControlSender<'a, M>,
}

impl<'a, M: RawMutex> CommandForwarder<'a, M> {
    pub fn new(sender: ControlSender<'a, M>) -> Self {
        Self { sender }
    }

    fn forward(&self, request: ControlRequest) {
        if self.sender.try_send(request).is_err() {
            warn!("Control queue full, dropping {:?}", request);
        }
    }
}

impl<M: RawMutex> CommandHandler for CommandForwarder<'_, M> {
    fn on_tare(&mut self) {
        self.forward(ControlRequest::Tare);
    }

    fn on_calibrate(&mut self, known_weight_kg: f32) {
        self.forward(ControlRequest::Calibrate(known_weight_kg));
    }

    fn on_command(&mut self, opcode: u8, _payload: &[u8]) {
        match CommandOpcode::from_repr(opcode) {
            Some(CommandOpcode::Shutdown) => self.forward(ControlRequest::Shutdown),
            Some(CommandOpcode::BatteryQuery) => self.forward(ControlRequest::BatteryQuery),
            Some(_) => {}
            None => info!("Unhandled command opcode {:#x}", opcode),
        }
    }
}
