//! The watering cycle: one pump on one outlet, bounded by the reservoir
//! switch, the soil probe, and a remote failsafe countdown.
//!
//! ## Per-attempt state machine
//!
//! ```text
//! Idle ──[run()]──▶ Armed ──[relay ON + failsafe]──▶ Running
//!   │                  │                                │ 1 s ticks
//!   │    [no water]    ▼                                ▼
//!   └────────────▶ AbortedNoWater      {CompletedSoilMoist, CompletedTimeout,
//!                                       AbortedNoWater, AbortedSensorUnavailable}
//! ```
//!
//! The device-side countdown is armed before the relay loop starts, so the
//! pump is bounded by `max_seconds` even if this process dies mid-run. The
//! local loop only ever ends a run earlier than that.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, warn};

use strip::{DeviceError, OutletSelector, OutletState, Session};

use crate::sensor::{MoistureProbe, MoistureReading, ProbeMode, SoilSensor, WaterSwitch};

/// Failsafe arming retries before the session falls back to forcing OFF.
const ARM_RETRIES: u32 = 1;

// ---------------------------------------------------------------------------
// Strip seam
// ---------------------------------------------------------------------------

/// The slice of the device session the controller needs.
#[async_trait]
pub trait StripControl: Send + Sync {
    /// Set the relay and arm the device-side failsafe for `delay_seconds`.
    async fn set_relay_state_timed(
        &self,
        outlet: &OutletSelector,
        state: OutletState,
        delay_seconds: u32,
    ) -> Result<(), DeviceError>;

    async fn set_relay_state(
        &self,
        outlet: &OutletSelector,
        state: OutletState,
    ) -> Result<(), DeviceError>;
}

#[async_trait]
impl StripControl for Session {
    async fn set_relay_state_timed(
        &self,
        outlet: &OutletSelector,
        state: OutletState,
        delay_seconds: u32,
    ) -> Result<(), DeviceError> {
        Session::set_relay_state_timed(self, outlet, state, delay_seconds, ARM_RETRIES).await
    }

    async fn set_relay_state(
        &self,
        outlet: &OutletSelector,
        state: OutletState,
    ) -> Result<(), DeviceError> {
        Session::set_relay_state(self, outlet, state).await
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WateringOutcome {
    /// Soil dropped below the watering threshold.
    CompletedSoilMoist,
    /// The full `max_seconds` elapsed.
    CompletedTimeout,
    /// Reservoir empty at entry or mid-run.
    AbortedNoWater,
    /// The soil sensor failed mid-run.
    AbortedSensorUnavailable,
}

#[derive(Debug, Clone, Copy)]
pub struct WateringReport {
    pub outcome: WateringOutcome,
    pub elapsed_sec: u32,
    /// Last moisture reading taken during the run, when one exists.
    pub moisture: Option<MoistureReading>,
}

#[derive(Debug, Error)]
pub enum CycleError {
    /// `run` was re-entered while a cycle was in progress.
    #[error("a watering cycle is already running")]
    Busy,

    #[error(transparent)]
    Device(#[from] DeviceError),
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Supervises one pump outlet, one soil probe, and one reservoir switch.
pub struct PumpController<C, W, S> {
    strip: C,
    outlet: OutletSelector,
    switch: W,
    probe: MoistureProbe<S>,
    busy: bool,
}

impl<C, W, S> PumpController<C, W, S>
where
    C: StripControl,
    W: WaterSwitch,
    S: SoilSensor,
{
    pub fn new(strip: C, outlet: OutletSelector, switch: W, probe: MoistureProbe<S>) -> Self {
        Self {
            strip,
            outlet,
            switch,
            probe,
            busy: false,
        }
    }

    /// Reservoir check, used by the driver's idle poll.
    pub fn water_available(&mut self) -> bool {
        self.switch.read()
    }

    /// Soil dryness check, used by the driver's idle poll.
    pub fn soil_status(&mut self, mode: ProbeMode) -> anyhow::Result<(bool, MoistureReading)> {
        self.probe.status(mode)
    }

    /// Run one bounded watering attempt of at most `max_seconds`.
    pub async fn run(&mut self, max_seconds: u32) -> Result<WateringReport, CycleError> {
        if self.busy {
            return Err(CycleError::Busy);
        }
        self.busy = true;
        let result = self.run_inner(max_seconds).await;
        self.busy = false;
        result
    }

    async fn run_inner(&mut self, max_seconds: u32) -> Result<WateringReport, CycleError> {
        // Reservoir guard before any side effect: sampled once, the outlet
        // is never commanded ON when this fails.
        if !self.switch.read() {
            warn!("water level too low, not starting pump");
            return Ok(WateringReport {
                outcome: WateringOutcome::AbortedNoWater,
                elapsed_sec: 0,
                moisture: None,
            });
        }

        // Relay ON with the device-side countdown armed for the same
        // bound. From here the pump cannot run past `max_seconds` even if
        // this process dies.
        self.strip
            .set_relay_state_timed(&self.outlet, OutletState::On, max_seconds)
            .await?;
        info!(max_seconds, outlet = %self.outlet, "pump on");

        let mut remaining = max_seconds;
        let mut last_reading = None;

        while remaining > 0 {
            sleep(Duration::from_secs(1)).await;
            remaining -= 1;
            let elapsed = max_seconds - remaining;

            if !self.switch.read() {
                self.strip
                    .set_relay_state(&self.outlet, OutletState::Off)
                    .await?;
                warn!(elapsed, "ran out of water mid-cycle, pump off");
                return Ok(WateringReport {
                    outcome: WateringOutcome::AbortedNoWater,
                    elapsed_sec: elapsed,
                    moisture: last_reading,
                });
            }

            match self.probe.status(ProbeMode::Watering) {
                Ok((dry, reading)) => {
                    last_reading = Some(reading);
                    if !dry {
                        self.strip
                            .set_relay_state(&self.outlet, OutletState::Off)
                            .await?;
                        info!(
                            elapsed,
                            moisture = reading.normalized,
                            "soil moist, pump off"
                        );
                        return Ok(WateringReport {
                            outcome: WateringOutcome::CompletedSoilMoist,
                            elapsed_sec: elapsed,
                            moisture: Some(reading),
                        });
                    }
                }
                Err(e) => {
                    self.strip
                        .set_relay_state(&self.outlet, OutletState::Off)
                        .await?;
                    error!(elapsed, "soil sensor unavailable mid-cycle, pump off: {e}");
                    return Ok(WateringReport {
                        outcome: WateringOutcome::AbortedSensorUnavailable,
                        elapsed_sec: elapsed,
                        moisture: last_reading,
                    });
                }
            }
        }

        // The device failsafe forces the outlet OFF at this same boundary;
        // the local command is idempotent and best-effort.
        if let Err(e) = self
            .strip
            .set_relay_state(&self.outlet, OutletState::Off)
            .await
        {
            warn!("post-timeout off command failed (failsafe covers it): {e}");
        }
        info!(max_seconds, "watering ran the full budget");
        Ok(WateringReport {
            outcome: WateringOutcome::CompletedTimeout,
            elapsed_sec: max_seconds,
            moisture: last_reading,
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================
