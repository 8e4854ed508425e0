//! Simulated sensors for development without the rig (default `sim`
//! feature). The soil value random-walks with a slow drying drift so idle
//! polls eventually cross the dryness threshold; the reservoir switch
//! holds a fixed level.

use crate::sensor::{SoilSensor, WaterSwitch};

/// Raw drying drift applied per sample. Positive = drier.
const DRIFT_PER_SAMPLE: f64 = 40.0;

/// Half-width of the uniform random step per sample, raw units.
const WALK_SIGMA: f64 = 150.0;

pub struct SimSoil {
    level: f64,
}

impl SimSoil {
    /// Start the walk at `start_raw` sensor units.
    pub fn new(start_raw: u16) -> Self {
        Self {
            level: start_raw as f64,
        }
    }
}

impl SoilSensor for SimSoil {
    fn read(&mut self) -> anyhow::Result<u16> {
        let step = (fastrand::f64() - 0.5) * 2.0 * WALK_SIGMA;
        self.level = (self.level + DRIFT_PER_SAMPLE + step).clamp(0.0, u16::MAX as f64);
        Ok(self.level.round() as u16)
    }
}

pub struct SimSwitch {
    present: bool,
}

impl SimSwitch {
    pub fn new(present: bool) -> Self {
        Self { present }
    }
}

impl WaterSwitch for SimSwitch {
    fn read(&mut self) -> bool {
        self.present
    }
}

// ===========================================================================
// Tests
// ===========================================================================
