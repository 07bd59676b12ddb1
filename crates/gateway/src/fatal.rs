//! Fatal boot indicator. The `gpio` feature drives a real LED through rppal;
//! without it, a mock logs the blink pattern instead.

use anyhow::Result;
use std::fmt;
use std::thread;
use std::time::Duration;
use tracing::error;

#[cfg(feature = "gpio")]
use anyhow::Context;
#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};

const PULSE_ON: Duration = Duration::from_millis(250);
const PULSE_OFF: Duration = Duration::from_millis(250);
const CODE_PAUSE: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FatalCode {
    NoStorage = 1,
    NoNetwork = 2,
}

impl FatalCode {
    pub fn pulses(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for FatalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoStorage => write!(f, "storage unavailable"),
            Self::NoNetwork => write!(f, "network unavailable"),
        }
    }
}

/// One cycle of the pattern: `pulses` on/off pairs, then a long dark pause.
pub fn blink_pattern(pulses: u8) -> Vec<(bool, Duration)> {
    let mut steps = Vec::with_capacity(usize::from(pulses) * 2 + 1);
    for _ in 0..pulses {
        steps.push((true, PULSE_ON));
        steps.push((false, PULSE_OFF));
    }
    steps.push((false, CODE_PAUSE));
    steps
}

// ---------------------------------------------------------------------------
// Real GPIO indicator (production, requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub struct FatalIndicator {
    pin: OutputPin,
}

#[cfg(feature = "gpio")]
impl FatalIndicator {
    pub fn new(gpio_pin: u8) -> Result<Self> {
        let gpio = Gpio::new().context("failed to open gpio")?;
        let mut pin = gpio
            .get(gpio_pin)
            .with_context(|| format!("gpio {gpio_pin} unavailable"))?
            .into_output();
        pin.set_low();
        Ok(Self { pin })
    }

    fn show(&mut self, lit: bool) {
        if lit {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }
}

// ---------------------------------------------------------------------------
// Mock indicator (development, no hardware)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub struct FatalIndicator {
    gpio_pin: u8,
}

#[cfg(not(feature = "gpio"))]
impl FatalIndicator {
    pub fn new(gpio_pin: u8) -> Result<Self> {
        tracing::info!(gpio_pin, "[mock-gpio] fatal indicator initialised (no hardware)");
        Ok(Self { gpio_pin })
    }

    fn show(&mut self, lit: bool) {
        tracing::trace!(gpio_pin = self.gpio_pin, lit, "[mock-gpio] indicator");
    }
}

impl FatalIndicator {
    /// Signal `code` forever. Nothing else runs after this.
    pub fn halt(mut self, code: FatalCode) -> ! {
        error!(code = code.pulses(), "fatal: {code}, halting");
        let pattern = blink_pattern(code.pulses());
        loop {
            for &(lit, hold) in &pattern {
                self.show(lit);
                thread::sleep(hold);
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
