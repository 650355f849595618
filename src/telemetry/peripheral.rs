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

//! Connection and measurement state of the strength service.
//!
//! Weight samples are collected into batches while a measurement is running
//! and sent as one notification when the batch is full or has waited for the
//! flush interval, whichever comes first. Timestamps in a batch are offsets
//! from the moment the measurement started.

use super::advertising::{AdvertisingError, AdvertisingPayload};
use super::handler::CommandHandler;
use super::{ConnHandle, LinkEvent, RadioLink, ServiceDefinition};
use crate::config::{TelemetryConfig, MAX_BATCH_SIZE, MAX_CONNECTIONS};
use embassy_time::{Duration, Instant};
use heapless::Vec;
use strength_monitor_messages::{
    encode_battery_level, encode_low_battery, encode_weight_batch, response::BATTERY_MESSAGE_SIZE, weight_batch_len,
    Command, CommandError, FrameError, WeightSample,
};

#[derive(Debug)]
pub enum PeripheralError<E> {
    /// The radio stack refused the GATT service
    Registration(E),
    Advertising(AdvertisingError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeripheralState {
    Advertising,
    Connected,
    Measuring,
}

pub struct StrengthPeripheral<R, H> {
    radio: R,
    handler: Option<H>,
    advertising: AdvertisingPayload,
    connections: Vec<ConnHandle, MAX_CONNECTIONS>,
    measuring: bool,
    measurement_start: Instant,
    batch: Vec<WeightSample, MAX_BATCH_SIZE>,
    batch_size: usize,
    flush_interval: Duration,
    last_flush: Instant,
}

fn elapsed(since: Instant, now: Instant) -> Duration {
    now.checked_duration_since(since).unwrap_or(Duration::from_ticks(0))
}

impl<R, H> StrengthPeripheral<R, H>
where
    R: RadioLink,
    H: CommandHandler,
{
    /// Registers the service and starts advertising. Registration failure is
    /// fatal for the peripheral.
    pub fn new(mut radio: R, config: &TelemetryConfig) -> Result<Self, PeripheralError<R::Error>> {
        let advertising =
            AdvertisingPayload::new(config.device_name, &config.service_uuid).map_err(PeripheralError::Advertising)?;
        radio
            .register_service(&ServiceDefinition::new(config))
            .map_err(PeripheralError::Registration)?;
        info!("Strength service registered");

        let now = Instant::now();
        let mut peripheral = Self {
            radio,
            handler: None,
            advertising,
            connections: Vec::new(),
            measuring: false,
            measurement_start: now,
            batch: Vec::new(),
            batch_size: config.batch_size.clamp(1, MAX_BATCH_SIZE),
            flush_interval: config.flush_interval,
            last_flush: now,
        };
        peripheral.advertise();
        Ok(peripheral)
    }

    pub fn set_handler(&mut self, handler: H) {
        self.handler = Some(handler);
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn state(&self) -> PeripheralState {
        if self.connections.is_empty() {
            PeripheralState::Advertising
        } else if self.measuring {
            PeripheralState::Measuring
        } else {
            PeripheralState::Connected
        }
    }

    pub fn is_connected(&self) -> bool {
        !self.connections.is_empty()
    }

    pub fn is_measuring(&self) -> bool {
        self.measuring
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn pending_samples(&self) -> usize {
        self.batch.len()
    }

    fn advertise(&mut self) {
        match self.radio.start_advertising(&self.advertising) {
            Ok(()) => info!("Advertising"),
            Err(_) => error!("Failed to start advertising"),
        }
    }

    pub fn handle_event(&mut self, event: LinkEvent<'_>, now: Instant) {
        match event {
            LinkEvent::Connected(conn) => self.on_connect(conn),
            LinkEvent::Disconnected(conn) => self.on_disconnect(conn),
            LinkEvent::ControlWrite { conn, value } => self.on_control_write(conn, value, now),
        }
    }

    fn on_connect(&mut self, conn: ConnHandle) {
        if self.connections.contains(&conn) {
            return;
        }
        if self.connections.push(conn).is_err() {
            warn!("Connection table full, ignoring connection {}", conn);
            return;
        }
        info!("Device connected: {}", conn);
    }

    fn on_disconnect(&mut self, conn: ConnHandle) {
        let Some(index) = self.connections.iter().position(|&c| c == conn) else {
            debug!("Disconnect for unknown connection {}", conn);
            return;
        };
        self.connections.swap_remove(index);
        info!("Device disconnected: {}", conn);

        self.measuring = false;
        self.batch.clear();
        if self.connections.is_empty() {
            self.advertise();
        }
    }

    fn on_control_write(&mut self, conn: ConnHandle, value: &[u8], now: Instant) {
        if !self.connections.contains(&conn) {
            warn!("Ignoring command from untracked connection {}", conn);
            return;
        }
        let command = match Command::decode(value) {
            Ok(command) => command,
            Err(CommandError::Empty) => return,
            Err(e) => {
                warn!("Dropping malformed command from {}: {:?}", conn, e);
                return;
            }
        };
        let opcode = command.opcode();
        debug!("Command {:#x} from {}", opcode, conn);

        match command {
            Command::Tare => {
                info!("Tare requested");
                if let Some(handler) = self.handler.as_mut() {
                    handler.on_tare();
                }
            }
            Command::StartMeasurement => self.start_measurement(now),
            Command::StopMeasurement => self.stop_measurement(now),
            Command::Calibrate { known_weight_kg } => {
                info!("Calibration requested with {} kg", known_weight_kg);
                if let Some(handler) = self.handler.as_mut() {
                    handler.on_calibrate(known_weight_kg);
                }
            }
            Command::Shutdown | Command::BatteryQuery | Command::Unknown { .. } => {}
        }

        if let Some(handler) = self.handler.as_mut() {
            handler.on_command(opcode, &value[1..]);
        }
    }

    fn start_measurement(&mut self, now: Instant) {
        info!("Measurement started");
        self.measuring = true;
        self.measurement_start = now;
        self.batch.clear();
        self.last_flush = now;
    }

    /// Ends the running measurement, sending any samples still batched.
    pub fn stop_measurement(&mut self, now: Instant) {
        if !self.batch.is_empty() {
            self.flush(now);
        }
        self.measuring = false;
        info!("Measurement stopped");
    }

    /// Queues a sample stamped with the current time.
    pub fn send_weight_measurement(&mut self, weight_kg: f32) -> bool {
        self.send_weight_measurement_at(weight_kg, Instant::now())
    }

    /// Queues a sample taken at `now`. Returns false without queueing when no
    /// central is connected or no measurement is running.
    pub fn send_weight_measurement_at(&mut self, weight_kg: f32, now: Instant) -> bool {
        if !self.is_connected() || !self.measuring {
            return false;
        }

        // Offsets wrap after about 35 minutes, the receiver sees them modulo 2^32
        let offset_us = elapsed(self.measurement_start, now).as_micros() as i32;
        let sample = WeightSample::new(weight_kg, offset_us);
        if let Err(sample) = self.batch.push(sample) {
            self.flush(now);
            let _ = self.batch.push(sample);
        }

        if self.batch.len() >= self.batch_size || elapsed(self.last_flush, now) >= self.flush_interval {
            self.flush(now);
        }
        true
    }

    fn flush(&mut self, now: Instant) {
        let mut buffer = [0u8; weight_batch_len(MAX_BATCH_SIZE)];
        match encode_weight_batch(&self.batch, &mut buffer) {
            Ok(len) => {
                trace!("Sending {} samples", self.batch.len());
                self.notify_all(&buffer[..len]);
            }
            Err(e) => error!("Failed to encode weight batch: {:?}", e),
        }
        self.batch.clear();
        self.last_flush = now;
    }

    pub fn send_battery_level(&mut self, millivolts: u32) -> bool {
        self.send_millivolts(encode_battery_level, millivolts)
    }

    pub fn send_low_battery(&mut self, millivolts: u32) -> bool {
        self.send_millivolts(encode_low_battery, millivolts)
    }

    fn send_millivolts(
        &mut self,
        encode: fn(u32, &mut [u8]) -> Result<usize, FrameError>,
        millivolts: u32,
    ) -> bool {
        if !self.is_connected() {
            return false;
        }
        let mut buffer = [0u8; BATTERY_MESSAGE_SIZE];
        match encode(millivolts, &mut buffer) {
            Ok(len) => {
                self.notify_all(&buffer[..len]);
                true
            }
            Err(e) => {
                error!("Failed to encode battery message: {:?}", e);
                false
            }
        }
    }

    fn notify_all(&mut self, data: &[u8]) {
        for &conn in self.connections.iter() {
            if self.radio.notify(conn, data).is_err() {
                warn!("Notification to connection {} failed", conn);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRadio;
    use strength_monitor_messages::Notification;

    #[derive(Default)]
    struct RecordingHandler {
        tares: usize,
        calibrations: std::vec::Vec<f32>,
        commands: std::vec::Vec<(u8, std::vec::Vec<u8>)>,
    }

    impl CommandHandler for RecordingHandler {
        fn on_tare(&mut self) {
            self.tares += 1;
        }

        fn on_calibrate(&mut self, known_weight_kg: f32) {
            self.calibrations.push(known_weight_kg);
        }

        fn on_command(&mut self, opcode: u8, payload: &[u8]) {
            self.commands.push((opcode, payload.to_vec()));
        }
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    fn peripheral() -> StrengthPeripheral<RecordingRadio, RecordingHandler> {
        let mut peripheral = StrengthPeripheral::new(RecordingRadio::default(), &TelemetryConfig::default()).unwrap();
        peripheral.set_handler(RecordingHandler::default());
        peripheral
    }

    fn handler(peripheral: &StrengthPeripheral<RecordingRadio, RecordingHandler>) -> &RecordingHandler {
        peripheral.handler.as_ref().unwrap()
    }

    fn write(peripheral: &mut StrengthPeripheral<RecordingRadio, RecordingHandler>, value: &[u8], now: Instant) {
        peripheral.handle_event(LinkEvent::ControlWrite { conn: 1, value }, now);
    }

    fn decode_batch(data: &[u8]) -> std::vec::Vec<WeightSample> {
        match Notification::decode(data).unwrap() {
            Notification::Weight(samples) => samples.collect(),
            other => panic!("expected weight notification, got {:?}", other),
        }
    }

    #[test]
    fn registers_service_and_advertises() {
        let peripheral = peripheral();
        let radio = peripheral.radio();
        assert_eq!(radio.registered.as_ref().map(|s| s.uuid), Some(crate::config::SERVICE_UUID));
        assert_eq!(radio.advertising_starts, 1);
        assert_eq!(peripheral.state(), PeripheralState::Advertising);
    }

    #[test]
    fn registration_failure_is_fatal() {
        let radio = RecordingRadio {
            fail_registration: true,
            ..Default::default()
        };
        let result = StrengthPeripheral::<_, RecordingHandler>::new(radio, &TelemetryConfig::default());
        assert!(matches!(result, Err(PeripheralError::Registration(_))));
    }

    #[test]
    fn batches_four_samples_per_notification() {
        let mut peripheral = peripheral();
        peripheral.handle_event(LinkEvent::Connected(1), at(0));
        write(&mut peripheral, &[0x65], at(0));
        assert_eq!(peripheral.state(), PeripheralState::Measuring);

        for (ms, weight) in [(1, 10.0), (2, 10.5), (3, 11.0)] {
            assert!(peripheral.send_weight_measurement_at(weight, at(ms)));
        }
        assert!(peripheral.radio().notifications.is_empty());

        assert!(peripheral.send_weight_measurement_at(11.5, at(4)));
        let notifications = &peripheral.radio().notifications;
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].0, 1);
        let samples = decode_batch(&notifications[0].1);
        assert_eq!(
            samples,
            std::vec![
                WeightSample::new(10.0, 1000),
                WeightSample::new(10.5, 2000),
                WeightSample::new(11.0, 3000),
                WeightSample::new(11.5, 4000),
            ]
        );
        assert_eq!(peripheral.pending_samples(), 0);
    }

    #[test]
    fn commands_from_untracked_connections_are_ignored() {
        let mut peripheral = peripheral();
        for conn in 1..=5 {
            peripheral.handle_event(LinkEvent::Connected(conn), at(0));
        }
        assert_eq!(peripheral.connection_count(), MAX_CONNECTIONS);

        peripheral.handle_event(LinkEvent::ControlWrite { conn: 5, value: &[0x65] }, at(0));
        peripheral.handle_event(LinkEvent::ControlWrite { conn: 5, value: &[0x64] }, at(0));
        assert!(!peripheral.is_measuring());
        assert_eq!(handler(&peripheral).tares, 0);

        peripheral.handle_event(LinkEvent::Disconnected(5), at(1));
        assert_eq!(peripheral.connection_count(), MAX_CONNECTIONS);
        assert_eq!(peripheral.radio().advertising_starts, 1);

        write(&mut peripheral, &[0x65], at(2));
        assert!(peripheral.is_measuring());
    }

    #[test]
    fn stale_batch_flushes_on_interval() {
        let mut peripheral = peripheral();
        peripheral.handle_event(LinkEvent::Connected(1), at(0));
        write(&mut peripheral, &[0x65], at(100));

        assert!(peripheral.send_weight_measurement_at(1.0, at(110)));
        assert!(peripheral.radio().notifications.is_empty());
        assert!(peripheral.send_weight_measurement_at(2.0, at(126)));

        let samples = decode_batch(&peripheral.radio().notifications[0].1);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].offset_us, 26_000);
    }

    #[test]
    fn stop_flushes_partial_batch() {
        let mut peripheral = peripheral();
        peripheral.handle_event(LinkEvent::Connected(1), at(0));
        write(&mut peripheral, &[0x65], at(0));
        peripheral.send_weight_measurement_at(3.0, at(1));
        write(&mut peripheral, &[0x66], at(2));

        assert!(!peripheral.is_measuring());
        assert_eq!(peripheral.state(), PeripheralState::Connected);
        assert_eq!(decode_batch(&peripheral.radio().notifications[0].1).len(), 1);
        assert!(!peripheral.send_weight_measurement_at(4.0, at(3)));
    }

    #[test]
    fn samples_are_dropped_when_idle() {
        let mut peripheral = peripheral();
        assert!(!peripheral.send_weight_measurement_at(1.0, at(1)));
        peripheral.handle_event(LinkEvent::Connected(1), at(2));
        assert!(!peripheral.send_weight_measurement_at(1.0, at(3)));
        assert_eq!(peripheral.pending_samples(), 0);
    }

    #[test]
    fn disconnect_ends_measurement_and_readvertises() {
        let mut peripheral = peripheral();
        peripheral.handle_event(LinkEvent::Connected(1), at(0));
        write(&mut peripheral, &[0x65], at(0));
        peripheral.send_weight_measurement_at(3.0, at(1));

        peripheral.handle_event(LinkEvent::Disconnected(1), at(2));
        assert!(!peripheral.is_measuring());
        assert_eq!(peripheral.pending_samples(), 0);
        assert_eq!(peripheral.state(), PeripheralState::Advertising);
        assert_eq!(peripheral.radio().advertising_starts, 2);
        assert!(peripheral.radio().notifications.is_empty());
    }

    #[test]
    fn readvertises_only_after_last_central_leaves() {
        let mut peripheral = peripheral();
        peripheral.handle_event(LinkEvent::Connected(1), at(0));
        peripheral.handle_event(LinkEvent::Connected(2), at(0));
        peripheral.handle_event(LinkEvent::Disconnected(1), at(1));
        assert_eq!(peripheral.radio().advertising_starts, 1);
        assert_eq!(peripheral.connection_count(), 1);

        peripheral.handle_event(LinkEvent::Disconnected(7), at(1));
        assert_eq!(peripheral.radio().advertising_starts, 1);

        peripheral.handle_event(LinkEvent::Disconnected(2), at(2));
        assert_eq!(peripheral.radio().advertising_starts, 2);
    }

    #[test]
    fn notifies_every_connected_central() {
        let mut peripheral = peripheral();
        peripheral.handle_event(LinkEvent::Connected(1), at(0));
        peripheral.handle_event(LinkEvent::Connected(2), at(0));
        assert!(peripheral.send_battery_level(3900));

        let notifications = &peripheral.radio().notifications;
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].1, std::vec![0x00, 0x3C, 0x0F, 0x00, 0x00]);
        assert_eq!(notifications[1].0, 2);
    }

    #[test]
    fn battery_messages_need_a_connection() {
        let mut peripheral = peripheral();
        assert!(!peripheral.send_battery_level(3900));
        assert!(!peripheral.send_low_battery(3100));
        peripheral.handle_event(LinkEvent::Connected(3), at(0));
        assert!(peripheral.send_low_battery(3100));
        assert_eq!(peripheral.radio().notifications[0].1[0], 0x04);
    }

    #[test]
    fn calibrate_command_reaches_handler() {
        let mut peripheral = peripheral();
        peripheral.handle_event(LinkEvent::Connected(1), at(0));
        let mut value = std::vec![0x67, 0x04];
        value.extend_from_slice(&20.0f32.to_le_bytes());
        write(&mut peripheral, &value, at(0));

        let handler = handler(&peripheral);
        assert_eq!(handler.calibrations, std::vec![20.0]);
        assert_eq!(handler.commands, std::vec![(0x67, value[1..].to_vec())]);
    }

    #[test]
    fn truncated_calibrate_is_dropped() {
        let mut peripheral = peripheral();
        peripheral.handle_event(LinkEvent::Connected(1), at(0));
        write(&mut peripheral, &[0x67, 0x04, 0x00], at(0));
        write(&mut peripheral, &[0x67, 0x04, 0x00, 0x00, 0xA0], at(0));

        let handler = handler(&peripheral);
        assert!(handler.calibrations.is_empty());
        assert!(handler.commands.is_empty());
    }

    #[test]
    fn tare_and_unknown_commands_are_forwarded() {
        let mut peripheral = peripheral();
        peripheral.handle_event(LinkEvent::Connected(1), at(0));
        write(&mut peripheral, &[0x64], at(0));
        write(&mut peripheral, &[0x99, 0x01, 0x02], at(0));
        write(&mut peripheral, &[], at(0));

        let handler = handler(&peripheral);
        assert_eq!(handler.tares, 1);
        assert_eq!(
            handler.commands,
            std::vec![(0x64, std::vec![]), (0x99, std::vec![0x01, 0x02])]
        );
        assert!(!peripheral.is_measuring());
    }

    #[test]
    fn restart_resets_timestamps() {
        let mut peripheral = peripheral();
        peripheral.handle_event(LinkEvent::Connected(1), at(0));
        write(&mut peripheral, &[0x65], at(0));
        peripheral.send_weight_measurement_at(1.0, at(5));
        write(&mut peripheral, &[0x65], at(50));
        assert_eq!(peripheral.pending_samples(), 0);

        for ms in 51..=54 {
            peripheral.send_weight_measurement_at(2.0, at(ms));
        }
        let samples = decode_batch(&peripheral.radio().notifications[0].1);
        assert_eq!(samples[0].offset_us, 1000);
    }
}
