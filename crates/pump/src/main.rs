mod config;
mod cycle;
mod driver;
#[cfg(feature = "gpio")]
mod hw;
mod sensor;
#[cfg(all(feature = "sim", not(feature = "gpio")))]
mod sim;

use std::{env, time::Duration};

use anyhow::Result;
use tracing::info;

use strip::{OutletSelector, Session};

use cycle::PumpController;
use driver::Driver;
use sensor::MoistureProbe;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load(&config_path)?;

    // ── Strip session ───────────────────────────────────────────────
    // Wi-Fi association and routing to the strip are assumed up already.
    let session = Session::open(
        &cfg.strip.host,
        cfg.strip.device_id.clone(),
        Duration::from_millis(cfg.strip.timeout_ms),
    )
    .await?;
    info!(
        device_id = session.device_id(),
        outlets = session.outlets().len(),
        "strip ready"
    );

    // ── Sensors ─────────────────────────────────────────────────────
    let (switch, soil) = build_sensors()?;
    let probe = MoistureProbe::new(
        soil,
        cfg.watering.upper_threshold,
        cfg.watering.lower_threshold,
    );

    // ── Control loop ────────────────────────────────────────────────
    let controller = PumpController::new(
        session,
        OutletSelector::Index(cfg.strip.outlet),
        switch,
        probe,
    );
    let mut driver = Driver::new(
        controller,
        Duration::from_millis(cfg.watering.poll_interval_ms),
        cfg.watering.max_seconds,
    );
    driver.run_forever().await;
    Ok(())
}

#[cfg(feature = "gpio")]
fn build_sensors() -> Result<(hw::FloatSwitch, hw::SoilProbeAdc)> {
    const ADS1115_ADDR: u16 = 0x48;

    let pin: u8 = env::var("WATER_SWITCH_PIN")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(2);
    let channel: usize = env::var("ADC_CHANNEL")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    info!(pin, channel, "using gpio sensors");
    Ok((hw::FloatSwitch::new(pin)?, hw::SoilProbeAdc::new(ADS1115_ADDR, channel)?))
}

#[cfg(all(feature = "sim", not(feature = "gpio")))]
fn build_sensors() -> Result<(sim::SimSwitch, sim::SimSoil)> {
    let start: u16 = env::var("SIM_SOIL_START")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(48_000);
    info!(start, "using simulated sensors");
    Ok((sim::SimSwitch::new(true), sim::SimSoil::new(start)))
}

#[cfg(all(not(feature = "sim"), not(feature = "gpio")))]
compile_error!("enable the `sim` or `gpio` feature to provide sensor backends");
