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

//! Top level loop: drains control requests, samples the scale at the
//! configured rate while a measurement runs, and answers battery queries.

use crate::application::messaging::{CommandForwarder, ControlChannel, ControlReceiver, ControlRequest};
use crate::config::MonitorConfig;
use crate::telemetry::peripheral::StrengthPeripheral;
use crate::telemetry::RadioLink;
use crate::weight::weight::WeightScale;
use crate::weight::StrainGauge;
use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant, Timer};

const LOOP_YIELD: Duration = Duration::from_millis(1);
const RATE_REPORT_INTERVAL: Duration = Duration::from_secs(1);

pub trait BatteryGauge {
    /// Battery voltage, `None` when it cannot be measured.
    async fn read_millivolts(&mut self) -> Option<u32>;
}

/// For boards without a battery monitor.
pub struct NoBattery;

impl BatteryGauge for NoBattery {
    async fn read_millivolts(&mut self) -> Option<u32> {
        None
    }
}

fn elapsed(since: Instant, now: Instant) -> Duration {
    now.checked_duration_since(since).unwrap_or(Duration::from_ticks(0))
}

pub struct StrengthMonitor<'a, G, R, B, M: RawMutex> {
    scale: WeightScale<G>,
    peripheral: StrengthPeripheral<R, CommandForwarder<'a, M>>,
    requests: ControlReceiver<'a, M>,
    battery: B,
    config: MonitorConfig,
    last_sample: Option<Instant>,
    samples_this_period: u32,
    last_rate_report: Instant,
    shutdown_requested: bool,
}

impl<'a, G, R, B, M> StrengthMonitor<'a, G, R, B, M>
where
    G: StrainGauge,
    R: RadioLink,
    B: BatteryGauge,
    M: RawMutex,
{
    /// Wires the peripheral's commands into `channel` and takes the receiving end.
    pub fn new(
        scale: WeightScale<G>,
        mut peripheral: StrengthPeripheral<R, CommandForwarder<'a, M>>,
        channel: &'a ControlChannel<M>,
        battery: B,
        config: MonitorConfig,
    ) -> Self {
        peripheral.set_handler(CommandForwarder::new(channel.sender()));
        Self {
            scale,
            peripheral,
            requests: channel.receiver(),
            battery,
            config,
            last_sample: None,
            samples_this_period: 0,
            last_rate_report: Instant::now(),
            shutdown_requested: false,
        }
    }

    pub fn scale(&self) -> &WeightScale<G> {
        &self.scale
    }

    pub fn peripheral(&self) -> &StrengthPeripheral<R, CommandForwarder<'a, M>> {
        &self.peripheral
    }

    /// Radio glue feeds link events through here.
    pub fn peripheral_mut(&mut self) -> &mut StrengthPeripheral<R, CommandForwarder<'a, M>> {
        &mut self.peripheral
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    /// Initial tare with whatever is on the load cell at power on.
    pub async fn start(&mut self) {
        if self.scale.is_simulated() {
            warn!("Running with simulated load cell data");
        }
        if let Err(e) = self.scale.tare().await {
            warn!("Initial tare failed: {:?}", e);
        }
        info!(
            "Sampling at {} Hz, waiting for connection",
            self.config.sample_rate_hz
        );
    }

    /// One pass of the main loop at time `now`.
    pub async fn poll(&mut self, now: Instant) {
        while let Ok(request) = self.requests.try_receive() {
            self.handle_request(request, now).await;
        }

        if self.shutdown_requested {
            return;
        }

        if self.peripheral.is_connected() && self.peripheral.is_measuring() {
            let due = self
                .last_sample
                .is_none_or(|last| elapsed(last, now) >= self.config.sample_interval());
            if due {
                let weight = self.scale.get_weight().await;
                self.peripheral.send_weight_measurement_at(weight, now);
                self.last_sample = Some(now);
                self.samples_this_period += 1;
            }
        } else {
            self.last_sample = None;
        }

        if elapsed(self.last_rate_report, now) >= RATE_REPORT_INTERVAL {
            if self.peripheral.is_measuring() {
                info!(
                    "Actual sampling rate: {} Hz (target {} Hz)",
                    self.samples_this_period, self.config.sample_rate_hz
                );
            }
            self.samples_this_period = 0;
            self.last_rate_report = now;
        }
    }

    async fn handle_request(&mut self, request: ControlRequest, now: Instant) {
        match request {
            ControlRequest::Tare => match self.scale.tare().await {
                Ok(()) => info!("Tare complete"),
                Err(e) => warn!("Tare failed: {:?}", e),
            },
            ControlRequest::Calibrate(known_weight_kg) => match self.scale.calibrate(known_weight_kg).await {
                Ok(()) => info!("Calibration complete"),
                Err(e) => error!("Calibration failed: {:?}", e),
            },
            ControlRequest::Shutdown => {
                info!("Shutdown requested");
                self.shutdown_requested = true;
                if self.peripheral.is_measuring() {
                    self.peripheral.stop_measurement(now);
                }
                if let Err(e) = self.scale.power_down().await {
                    warn!("Failed to power down load cell: {:?}", e);
                }
            }
            ControlRequest::BatteryQuery => self.report_battery().await,
        }
    }

    async fn report_battery(&mut self) {
        let Some(millivolts) = self.battery.read_millivolts().await else {
            warn!("Battery level unavailable");
            return;
        };
        debug!("Battery at {} mV", millivolts);
        self.peripheral.send_battery_level(millivolts);
        if millivolts < self.config.low_battery_mv {
            warn!("Low battery: {} mV", millivolts);
            self.peripheral.send_low_battery(millivolts);
        }
    }

    /// Runs until a shutdown command arrives. The caller then cuts power.
    pub async fn run(&mut self) {
        self.start().await;
        while !self.shutdown_requested {
            self.poll(Instant::now()).await;
            select(self.requests.ready_to_receive(), Timer::after(LOOP_YIELD)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::messaging::ControlChannel;
    use crate::config::{ScaleConfig, TelemetryConfig};
    use crate::telemetry::LinkEvent;
    use crate::testing::{RecordingRadio, ScriptedGauge};
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use strength_monitor_messages::Notification;

    struct FixedBattery(u32);

    impl BatteryGauge for FixedBattery {
        async fn read_millivolts(&mut self) -> Option<u32> {
            Some(self.0)
        }
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    fn scale_config() -> ScaleConfig {
        ScaleConfig {
            tare_samples: 2,
            calibration_samples: 2,
            ..Default::default()
        }
    }

    fn monitor<'a, B: BatteryGauge>(
        scale: WeightScale<ScriptedGauge>,
        channel: &'a ControlChannel<NoopRawMutex>,
        battery: B,
    ) -> StrengthMonitor<'a, ScriptedGauge, RecordingRadio, B, NoopRawMutex> {
        let peripheral = StrengthPeripheral::new(RecordingRadio::default(), &TelemetryConfig::default()).unwrap();
        StrengthMonitor::new(scale, peripheral, channel, battery, MonitorConfig::default())
    }

    #[test]
    fn tare_command_runs_on_next_poll() {
        let channel = ControlChannel::<NoopRawMutex>::new();
        block_on(async {
            let scale = WeightScale::new(ScriptedGauge::new([Ok(0), Ok(250), Ok(250)]), scale_config()).await;
            let mut monitor = monitor(scale, &channel, NoBattery);
            monitor.peripheral_mut().handle_event(LinkEvent::Connected(1), at(0));
            monitor
                .peripheral_mut()
                .handle_event(LinkEvent::ControlWrite { conn: 1, value: &[0x64] }, at(0));
            assert_eq!(monitor.scale().calibration().offset(), 0.0);

            monitor.poll(at(1)).await;
            assert_eq!(monitor.scale().calibration().offset(), 250.0);
        });
    }

    #[test]
    fn samples_at_configured_rate_while_measuring() {
        let channel = ControlChannel::<NoopRawMutex>::new();
        block_on(async {
            let gauge = ScriptedGauge::new(core::iter::repeat(Ok(100)).take(50));
            let scale = WeightScale::new(gauge, scale_config()).await;
            let mut monitor = monitor(scale, &channel, NoBattery);

            // Not connected, nothing sampled
            monitor.poll(at(0)).await;
            monitor.peripheral_mut().handle_event(LinkEvent::Connected(1), at(0));
            monitor
                .peripheral_mut()
                .handle_event(LinkEvent::ControlWrite { conn: 1, value: &[0x65] }, at(0));

            // 80 Hz is one sample every 12.5 ms, so the 25 ms flush fires before a batch fills
            for ms in [0, 5, 13, 20, 26, 30, 39] {
                monitor.poll(at(ms)).await;
            }
            let notifications = &monitor.peripheral().radio().notifications;
            assert_eq!(notifications.len(), 1);
            match Notification::decode(&notifications[0].1).unwrap() {
                Notification::Weight(samples) => {
                    let offsets: std::vec::Vec<i32> = samples.map(|s| s.offset_us).collect();
                    assert_eq!(offsets, std::vec![0, 13_000, 26_000]);
                }
                other => panic!("unexpected notification {:?}", other),
            }
            assert_eq!(monitor.peripheral().pending_samples(), 1);
        });
    }

    #[test]
    fn battery_query_reports_low_battery() {
        let channel = ControlChannel::<NoopRawMutex>::new();
        block_on(async {
            let scale = WeightScale::new(ScriptedGauge::new([Ok(0)]), scale_config()).await;
            let mut monitor = monitor(scale, &channel, FixedBattery(3200));
            monitor.peripheral_mut().handle_event(LinkEvent::Connected(1), at(0));
            monitor
                .peripheral_mut()
                .handle_event(LinkEvent::ControlWrite { conn: 1, value: &[0x6F] }, at(0));
            monitor.poll(at(1)).await;

            let notifications = &monitor.peripheral().radio().notifications;
            assert_eq!(notifications.len(), 2);
            assert!(matches!(
                Notification::decode(&notifications[0].1),
                Ok(Notification::Battery { millivolts: 3200 })
            ));
            assert!(matches!(
                Notification::decode(&notifications[1].1),
                Ok(Notification::LowBattery { millivolts: 3200 })
            ));
        });
    }

    #[test]
    fn shutdown_powers_down_and_stops_sampling() {
        let channel = ControlChannel::<NoopRawMutex>::new();
        block_on(async {
            let scale = WeightScale::new(ScriptedGauge::new([Ok(0), Ok(1), Ok(1)]), scale_config()).await;
            let mut monitor = monitor(scale, &channel, NoBattery);
            monitor.peripheral_mut().handle_event(LinkEvent::Connected(1), at(0));
            monitor
                .peripheral_mut()
                .handle_event(LinkEvent::ControlWrite { conn: 1, value: &[0x65] }, at(0));
            monitor
                .peripheral_mut()
                .handle_event(LinkEvent::ControlWrite { conn: 1, value: &[0x6E] }, at(0));

            monitor.poll(at(1)).await;
            assert!(monitor.is_shutdown_requested());
            assert!(!monitor.peripheral().is_measuring());
            assert_eq!(monitor.peripheral().pending_samples(), 0);

            monitor.poll(at(20)).await;
            assert!(monitor.peripheral().radio().notifications.is_empty());
        });
    }

    #[test]
    fn calibrate_command_updates_scale() {
        let channel = ControlChannel::<NoopRawMutex>::new();
        block_on(async {
            let gauge = ScriptedGauge::new([Ok(0), Ok(0), Ok(0), Ok(4000), Ok(4000)]);
            let scale = WeightScale::new(gauge, scale_config()).await;
            let mut monitor = monitor(scale, &channel, NoBattery);
            monitor.start().await;

            monitor.peripheral_mut().handle_event(LinkEvent::Connected(1), at(0));
            let mut value = std::vec![0x67, 0x04];
            value.extend_from_slice(&4.0f32.to_le_bytes());
            monitor
                .peripheral_mut()
                .handle_event(LinkEvent::ControlWrite { conn: 1, value: &value }, at(0));
            monitor.poll(at(1)).await;

            assert_eq!(monitor.scale().calibration().scale(), 1000.0);
        });
    }
}
