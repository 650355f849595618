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

//! Bit-banged HX711 front end.

use super::{AcquisitionError, AdcFrontEnd, RAW_SAMPLE_BITS, WORD_MASK};
use crate::config::Hx711Config;
use embassy_time::{with_timeout, Duration, Instant, Ticker, Timer};

/// Channel and gain selected for the *next* conversion, set by the number of
/// extra clock pulses after the 24 data bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Hx711Gain {
    Gain128,
    Gain64,
    Gain32ChannelB,
}

impl Hx711Gain {
    fn tick_count(&self) -> usize {
        match self {
            Hx711Gain::Gain128 => 25,
            Hx711Gain::Gain64 => 27,
            Hx711Gain::Gain32ChannelB => 26,
        }
    }
}

/// How the driver learns that DOUT has gone low
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TriggerMode {
    /// Busy poll the data line for a bounded number of iterations
    Polling,
    /// Wait on the pin's falling level, bounded by a timeout
    Edge,
}

const POWER_MODE_CHANGE_DELAY: Duration = Duration::from_micros(60);
const CLK_HALF_PERIOD: Duration = Duration::from_micros(1);

const TRIGGER_CALIBRATION_READS: u64 = 3;
const MAX_TRIGGER_LOOPS: u64 = 10_000_000;

const RESET_CLOCK_PULSES: usize = 80;
const RESET_PULSE_HALF_PERIOD: Duration = Duration::from_micros(10);
const RESET_SETTLE: Duration = Duration::from_millis(10);
const RESET_READY_POLLS: usize = 500;
const RESET_READY_POLL_INTERVAL: Duration = Duration::from_micros(10);

pub struct Hx711Async<CLK, DATA> {
    clock_pin: CLK,
    data_pin: DATA,
    gain_clocks: usize,
    trigger: TriggerMode,
    trigger_budget: Duration,
    edge_timeout: Duration,
    trigger_loops: u64,
    powered_up: bool,
}

impl<CLK, DATA> Hx711Async<CLK, DATA>
where
    CLK: embedded_hal::digital::OutputPin,
    DATA: embedded_hal_async::digital::Wait + embedded_hal::digital::InputPin,
{
    pub fn new(clock_pin: CLK, data_pin: DATA, config: Hx711Config) -> Self {
        Self {
            clock_pin,
            data_pin,
            gain_clocks: config.gain.tick_count(),
            trigger: config.trigger,
            trigger_budget: config.trigger_budget,
            edge_timeout: config.edge_timeout,
            trigger_loops: MAX_TRIGGER_LOOPS,
            powered_up: false,
        }
    }

    pub fn set_gain(&mut self, gain: Hx711Gain) {
        self.gain_clocks = gain.tick_count();
    }

    /// Busy poll iterations allowed before giving up on a conversion
    pub fn trigger_loops(&self) -> u64 {
        self.trigger_loops
    }

    fn data_is_low(&mut self) -> Result<bool, AcquisitionError> {
        self.data_pin.is_low().map_err(|_| AcquisitionError::Bus)
    }

    fn set_clock(&mut self, high: bool) -> Result<(), AcquisitionError> {
        let result = if high {
            self.clock_pin.set_high()
        } else {
            self.clock_pin.set_low()
        };
        result.map_err(|_| AcquisitionError::Bus)
    }

    /// Times a few reads of the data line and converts the trigger budget into
    /// a loop count, so the busy poll is bounded in time on any core clock.
    fn calibrate_trigger_wait(&mut self) -> Result<(), AcquisitionError> {
        let start = Instant::now();
        for _ in 0..TRIGGER_CALIBRATION_READS {
            self.data_is_low()?;
        }
        let spent_us = Instant::now()
            .checked_duration_since(start)
            .map(|spent| spent.as_micros())
            .unwrap_or(0)
            .max(1);

        self.trigger_loops = (self.trigger_budget.as_micros() * TRIGGER_CALIBRATION_READS / spent_us)
            .clamp(1, MAX_TRIGGER_LOOPS);
        debug!("HX711 trigger wait bounded to {} polls", self.trigger_loops);
        Ok(())
    }
}

impl<CLK, DATA> AdcFrontEnd for Hx711Async<CLK, DATA>
where
    CLK: embedded_hal::digital::OutputPin,
    DATA: embedded_hal_async::digital::Wait + embedded_hal::digital::InputPin,
{
    async fn initialize(&mut self) -> Result<(), AcquisitionError> {
        self.power_up().await?;
        self.calibrate_trigger_wait()
    }

    async fn wait_ready(&mut self) -> Result<(), AcquisitionError> {
        if !self.powered_up {
            self.power_up().await?;
        }

        // DOUT goes low when conversion is ready
        match self.trigger {
            TriggerMode::Polling => {
                for _ in 0..self.trigger_loops {
                    if self.data_is_low()? {
                        return Ok(());
                    }
                }
                Err(AcquisitionError::NoTrigger)
            }
            TriggerMode::Edge => match with_timeout(self.edge_timeout, self.data_pin.wait_for_low()).await {
                Ok(result) => result.map_err(|_| AcquisitionError::Bus),
                Err(_) => Err(AcquisitionError::PollTimeout),
            },
        }
    }

    async fn transfer_word(&mut self) -> Result<u32, AcquisitionError> {
        let mut clock_ticker = Ticker::every(CLK_HALF_PERIOD);
        let mut data: u32 = 0;

        clock_ticker.next().await;
        for _ in 0..self.gain_clocks {
            data <<= 1;
            self.set_clock(true)?;
            clock_ticker.next().await;
            self.set_clock(false)?;
            if !self.data_is_low()? {
                data |= 0x1;
            }
            clock_ticker.next().await;
        }

        let data_bits_to_discard = self.gain_clocks - RAW_SAMPLE_BITS;
        Ok((data >> data_bits_to_discard) & WORD_MASK)
    }

    async fn reset(&mut self) -> Result<(), AcquisitionError> {
        warn!("Resetting HX711");
        for _ in 0..RESET_CLOCK_PULSES {
            self.set_clock(true)?;
            Timer::after(RESET_PULSE_HALF_PERIOD).await;
            self.set_clock(false)?;
            Timer::after(RESET_PULSE_HALF_PERIOD).await;
        }

        // Holding the clock high past 60us powers the chip down, releasing it restarts conversion
        self.power_down().await?;
        self.power_up().await?;
        Timer::after(RESET_SETTLE).await;

        for _ in 0..RESET_READY_POLLS {
            if self.data_is_low()? {
                info!("HX711 reset complete");
                return Ok(());
            }
            Timer::after(RESET_READY_POLL_INTERVAL).await;
        }
        error!("HX711 did not signal a conversion after reset");
        Err(AcquisitionError::BusNotResponding)
    }

    async fn power_down(&mut self) -> Result<(), AcquisitionError> {
        self.set_clock(true)?;
        Timer::after(POWER_MODE_CHANGE_DELAY).await;
        self.powered_up = false;
        Ok(())
    }

    async fn power_up(&mut self) -> Result<(), AcquisitionError> {
        self.set_clock(false)?;
        Timer::after(POWER_MODE_CHANGE_DELAY).await;
        self.powered_up = true;
        Ok(())
    }
}
