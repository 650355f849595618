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

/// Receives decoded control commands from the peripheral.
///
/// The peripheral runs inside the radio stack's event handling, so
/// implementations should hand work off rather than do it inline.
pub trait CommandHandler {
    fn on_tare(&mut self) {}

    fn on_calibrate(&mut self, _known_weight_kg: f32) {}

    /// Called for every decoded command, after any specific callback.
    fn on_command(&mut self, _opcode: u8, _payload: &[u8]) {}
}

