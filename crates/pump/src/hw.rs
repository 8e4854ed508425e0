//! Raspberry Pi sensor backends (`gpio` feature): the reservoir float
//! switch on a GPIO input and the soil probe on an ADS1115 channel over
//! I2C.

use std::{thread, time::Duration};

use anyhow::Result;
use rppal::gpio::{Gpio, InputPin};
use rppal::i2c::I2c;

use crate::sensor::{SoilSensor, WaterSwitch};

// ── Float switch ────────────────────────────────────────────────────────────

/// Reservoir switch on a pulled-up input: floats high while there is
/// water, pulled to ground when the float drops.
pub struct FloatSwitch {
    pin: InputPin,
}

impl FloatSwitch {
    pub fn new(bcm_pin: u8) -> Result<Self> {
        let pin = Gpio::new()?.get(bcm_pin)?.into_input_pullup();
        Ok(Self { pin })
    }
}

impl WaterSwitch for FloatSwitch {
    fn read(&mut self) -> bool {
        self.pin.is_high()
    }
}

// ── ADS1115 soil probe ──────────────────────────────────────────────────────

/// Conversion result register (read-only, 16-bit signed).
const REG_CONVERSION: u8 = 0x00;
/// Configuration register (read/write).
const REG_CONFIG: u8 = 0x01;

/// OS=1 (start conversion), PGA ±4.096 V, single-shot, 128 SPS,
/// comparator off.
const CONFIG_BASE: u16 = 0b1_000_001_1_100_0_0_0_11;

/// Single-ended MUX values (AINx vs GND) for channels 0–3, placed in
/// config bits [14:12].
const MUX_SINGLE_ENDED: [u16; 4] = [0b100, 0b101, 0b110, 0b111];
const MUX_SHIFT: u8 = 12;

/// Conversion at 128 SPS takes ~7.8 ms; wait with margin.
const CONVERSION_WAIT: Duration = Duration::from_millis(9);

pub struct SoilProbeAdc {
    i2c: I2c,
    channel: usize,
}

impl SoilProbeAdc {
    /// Open I2C bus 1 for an ADS1115 at `addr`, reading single-ended
    /// `channel` (0–3).
    pub fn new(addr: u16, channel: usize) -> Result<Self> {
        anyhow::ensure!(
            channel < MUX_SINGLE_ENDED.len(),
            "ADS1115 channel {channel} out of range (0–3)"
        );
        let mut i2c = I2c::new()?;
        i2c.set_slave_address(addr)?;
        Ok(Self { i2c, channel })
    }

    fn config_word(&self) -> u16 {
        CONFIG_BASE | (MUX_SINGLE_ENDED[self.channel] << MUX_SHIFT)
    }
}

impl SoilSensor for SoilProbeAdc {
    fn read(&mut self) -> Result<u16> {
        self.i2c
            .block_write(REG_CONFIG, &self.config_word().to_be_bytes())?;
        thread::sleep(CONVERSION_WAIT);

        let mut buf = [0u8; 2];
        self.i2c.block_read(REG_CONVERSION, &mut buf)?;
        // Single-ended reads are non-negative; clamp against bus noise.
        Ok(i16::from_be_bytes(buf).max(0) as u16)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
