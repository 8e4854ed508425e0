//! Sensor capability seams and the dual-threshold moisture probe. Pin-level
//! sampling lives behind the two traits; backends are the `sim` and `gpio`
//! modules.

use anyhow::Result;

/// Raw soil-moisture source, sampled on demand. Higher raw values read
/// drier for the capacitive probes this rig uses.
pub trait SoilSensor: Send {
    fn read(&mut self) -> Result<u16>;
}

/// Reservoir level switch, sampled on demand. `true` means there is
/// enough water to run the pump.
pub trait WaterSwitch: Send {
    fn read(&mut self) -> bool;
}

// ---------------------------------------------------------------------------
// Moisture probe
// ---------------------------------------------------------------------------

/// Which threshold a dryness check compares against. Idle polling asks
/// "should watering start?" (upper threshold); an active watering run asks
/// "should it keep going?" (lower threshold).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    Idle,
    Watering,
}

#[derive(Debug, Clone, Copy)]
pub struct MoistureReading {
    pub raw: u16,
    /// raw / 100, the scale both thresholds are configured on.
    pub normalized: f32,
}

/// Soil sensor plus the two dryness thresholds, compared on the raw/100
/// scale.
pub struct MoistureProbe<S> {
    sensor: S,
    upper: f32,
    lower: f32,
}

impl<S: SoilSensor> MoistureProbe<S> {
    pub fn new(sensor: S, upper: f32, lower: f32) -> Self {
        Self {
            sensor,
            upper,
            lower,
        }
    }

    /// Sample the sensor and report `(dry, reading)` for the given mode.
    /// Watering mode counts the soil as dry until the value drops below
    /// the lower threshold; idle mode only counts it dry above the upper
    /// one.
    pub fn status(&mut self, mode: ProbeMode) -> Result<(bool, MoistureReading)> {
        let raw = self.sensor.read()?;
        let normalized = raw as f32 / 100.0;
        let dry = match mode {
            ProbeMode::Watering => normalized >= self.lower,
            ProbeMode::Idle => normalized > self.upper,
        };
        Ok((dry, MoistureReading { raw, normalized }))
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSensor(u16);

    impl SoilSensor for FixedSensor {
        fn read(&mut self) -> Result<u16> {
            Ok(self.0)
        }
    }

    fn probe(raw: u16) -> MoistureProbe<FixedSensor> {
        MoistureProbe::new(FixedSensor(raw), 500.0, 400.0)
    }

    // -- Normalization ------------------------------------------------------

    #[test]
    fn normalized_is_raw_over_hundred() {
        let (_, reading) = probe(45_000).status(ProbeMode::Idle).unwrap();
        assert_eq!(reading.raw, 45_000);
        assert!((reading.normalized - 450.0).abs() < f32::EPSILON);
    }

    // -- Idle mode (upper threshold, strict greater-than) -------------------

    #[test]
    fn idle_above_upper_is_dry() {
        let (dry, _) = probe(52_000).status(ProbeMode::Idle).unwrap();
        assert!(dry);
    }

    #[test]
    fn idle_at_upper_is_not_dry() {
        let (dry, _) = probe(50_000).status(ProbeMode::Idle).unwrap();
        assert!(!dry);
    }

    #[test]
    fn idle_below_upper_is_not_dry() {
        let (dry, _) = probe(45_000).status(ProbeMode::Idle).unwrap();
        assert!(!dry);
    }

    // -- Watering mode (lower threshold, greater-or-equal) ------------------

    #[test]
    fn watering_above_lower_is_still_dry() {
        let (dry, _) = probe(45_000).status(ProbeMode::Watering).unwrap();
        assert!(dry);
    }

    #[test]
    fn watering_at_lower_is_still_dry() {
        let (dry, _) = probe(40_000).status(ProbeMode::Watering).unwrap();
        assert!(dry);
    }

    #[test]
    fn watering_below_lower_is_satisfied() {
        let (dry, _) = probe(39_900).status(ProbeMode::Watering).unwrap();
        assert!(!dry);
    }

    // -- Failure passthrough ------------------------------------------------

    #[test]
    fn sensor_failure_propagates() {
        struct Broken;
        impl SoilSensor for Broken {
            fn read(&mut self) -> Result<u16> {
                anyhow::bail!("i2c bus gone")
            }
        }
        let mut probe = MoistureProbe::new(Broken, 500.0, 400.0);
        assert!(probe.status(ProbeMode::Idle).is_err());
    }
}
