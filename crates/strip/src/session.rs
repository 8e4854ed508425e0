//! Device session: identity and outlet topology for one strip, plus every
//! high-level operation. Topology is fetched once at open and cached for
//! the session's lifetime. External renames make it stale, and callers
//! needing freshness must open a new session.
//!
//! Convention observed on the device family: the system-info query goes
//! over the datagram transport; every mutating or outlet-addressed command
//! goes over the stream transport.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::command::{self, OutletState};
use crate::error::DeviceError;
use crate::transport::{NetTransport, Transport, TransportMode};

// ---------------------------------------------------------------------------
// Addressing
// ---------------------------------------------------------------------------

/// How a caller names one outlet. Indexes are 1-based at this API; the
/// wire id is the strip's device id plus the two-digit zero-padded
/// 0-based index, so `Index(1)` on strip "ABC" addresses "ABC00".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutletSelector {
    Index(u8),
    Alias(String),
}

impl fmt::Display for OutletSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(n) => write!(f, "outlet #{n}"),
            Self::Alias(a) => write!(f, "outlet '{a}'"),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire-facing data
// ---------------------------------------------------------------------------

/// One entry of the strip's child table, as reported by system info.
/// `id` is the two-digit local suffix, not the full outlet id.
#[derive(Debug, Clone, Deserialize)]
pub struct OutletInfo {
    pub id: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub state: u8,
}

/// Realtime emeter snapshot. Fields absent on some firmware default to 0.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnergySnapshot {
    #[serde(default)]
    pub current: f64,
    #[serde(default)]
    pub voltage: f64,
    #[serde(default)]
    pub power: f64,
    #[serde(default)]
    pub total: f64,
}

/// One row of the per-day energy statistics. Older firmware reports the
/// figure under `energy` instead of `energy_wh`.
#[derive(Debug, Clone, Deserialize)]
pub struct DailyEnergy {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    #[serde(default, alias = "energy")]
    pub energy_wh: f64,
}

/// A device-resident countdown rule. Volatile as far as this design is
/// concerned: never cached locally, always cleared before re-arming.
#[derive(Debug, Clone, Deserialize)]
pub struct CountdownRule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub enable: u8,
    #[serde(default)]
    pub delay: u32,
    #[serde(default)]
    pub act: i8,
}

/// Label carried by the failsafe rule this session installs.
const FAILSAFE_LABEL: &str = "turn off";

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    device_id: String,
    outlets: Vec<OutletInfo>,
    transport: Box<dyn Transport>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("device_id", &self.device_id)
            .field("outlets", &self.outlets)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open a session against `host`: queries system info over the
    /// datagram transport, then caches device id and outlet topology.
    /// If the query fails there is no session, never a half-built one.
    pub async fn open(
        host: &str,
        device_id: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DeviceError> {
        Self::with_transport(Box::new(NetTransport::new(host, timeout)), device_id).await
    }

    /// Same as [`Session::open`] over a caller-supplied transport.
    pub async fn with_transport(
        transport: Box<dyn Transport>,
        device_id: Option<String>,
    ) -> Result<Self, DeviceError> {
        let response = transport
            .exchange(&command::sysinfo().to_string(), TransportMode::Datagram)
            .await
            .map_err(DeviceError::Unreachable)?;

        let info = section(&response, "system", "get_sysinfo")?;

        let device_id = match device_id {
            Some(id) => id,
            None => info
                .get("deviceId")
                .and_then(Value::as_str)
                .ok_or_else(|| DeviceError::Protocol("system info lacks deviceId".into()))?
                .to_string(),
        };

        let outlets: Vec<OutletInfo> = match info.get("children") {
            Some(children) => serde_json::from_value(children.clone())
                .map_err(|e| DeviceError::Protocol(format!("bad children table: {e}")))?,
            None => Vec::new(),
        };

        info!(
            device_id = %device_id,
            outlets = outlets.len(),
            "strip session open"
        );

        Ok(Self {
            device_id,
            outlets,
            transport,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Cached topology snapshot from open time.
    pub fn outlets(&self) -> &[OutletInfo] {
        &self.outlets
    }

    // -- Addressing ---------------------------------------------------------

    /// Resolve a selector to the full wire outlet id. Index resolution is
    /// pure string composition against the device id; alias resolution
    /// scans the cached topology.
    pub fn resolve_outlet(&self, selector: &OutletSelector) -> Result<String, DeviceError> {
        match selector {
            OutletSelector::Index(n) => {
                if *n == 0 {
                    return Err(DeviceError::OutletNotFound(selector.to_string()));
                }
                Ok(format!("{}{:02}", self.device_id, n - 1))
            }
            OutletSelector::Alias(alias) => self
                .outlets
                .iter()
                .find(|o| o.alias == *alias)
                .map(|o| format!("{}{}", self.device_id, o.id))
                .ok_or_else(|| DeviceError::OutletNotFound(selector.to_string())),
        }
    }

    /// Cached child-table entry for one outlet.
    pub fn outlet_info(&self, selector: &OutletSelector) -> Result<&OutletInfo, DeviceError> {
        let full_id = self.resolve_outlet(selector)?;
        let local = full_id
            .strip_prefix(self.device_id.as_str())
            .unwrap_or(&full_id);
        self.outlets
            .iter()
            .find(|o| o.id == local)
            .ok_or_else(|| DeviceError::OutletNotFound(selector.to_string()))
    }

    // -- Relay control ------------------------------------------------------

    pub async fn set_relay_state(
        &self,
        outlet: &OutletSelector,
        state: OutletState,
    ) -> Result<(), DeviceError> {
        let id = self.resolve_outlet(outlet)?;
        let cmd = command::with_context(&[id], command::set_relay_state(state));
        let response = self.send(&cmd).await?;
        section(&response, "system", "set_relay_state")?;
        Ok(())
    }

    /// Bulk form: one command addressing several outlets at once.
    pub async fn set_relay_states(
        &self,
        outlets: &[OutletSelector],
        state: OutletState,
    ) -> Result<(), DeviceError> {
        let ids = outlets
            .iter()
            .map(|s| self.resolve_outlet(s))
            .collect::<Result<Vec<_>, _>>()?;
        let cmd = command::with_context(&ids, command::set_relay_state(state));
        let response = self.send(&cmd).await?;
        section(&response, "system", "set_relay_state")?;
        Ok(())
    }

    // -- Metering -----------------------------------------------------------

    pub async fn get_realtime_energy(
        &self,
        outlet: &OutletSelector,
    ) -> Result<EnergySnapshot, DeviceError> {
        let id = self.resolve_outlet(outlet)?;
        let cmd = command::with_context(&[id], command::realtime_energy());
        let response = self.send(&cmd).await?;
        let sec = section(&response, "emeter", "get_realtime")?;
        serde_json::from_value(sec.clone())
            .map_err(|e| DeviceError::Protocol(format!("bad realtime energy: {e}")))
    }

    pub async fn get_historical_energy(
        &self,
        outlet: &OutletSelector,
        month: u8,
        year: u16,
    ) -> Result<Vec<DailyEnergy>, DeviceError> {
        let id = self.resolve_outlet(outlet)?;
        let cmd = command::with_context(&[id], command::daily_energy(month, year));
        let response = self.send(&cmd).await?;
        let sec = section(&response, "emeter", "get_daystat")?;
        let days = sec
            .get("day_list")
            .ok_or_else(|| DeviceError::Protocol("get_daystat lacks day_list".into()))?;
        serde_json::from_value(days.clone())
            .map_err(|e| DeviceError::Protocol(format!("bad day_list: {e}")))
    }

    // -- Naming, LEDs, maintenance -------------------------------------------

    pub async fn set_alias(&self, outlet: &OutletSelector, name: &str) -> Result<(), DeviceError> {
        let id = self.resolve_outlet(outlet)?;
        let cmd = command::with_context(&[id], command::set_alias(name));
        let response = self.send(&cmd).await?;
        section(&response, "system", "set_dev_alias")?;
        Ok(())
    }

    /// Strip-wide indicator LEDs. The wire value is inverted relative to
    /// `state` (off=1 means the LEDs are dark).
    pub async fn toggle_indicator_leds(&self, state: OutletState) -> Result<(), DeviceError> {
        let response = self.send(&command::set_led_state(state)).await?;
        section(&response, "system", "set_led_off")?;
        Ok(())
    }

    pub async fn reboot(&self, delay_seconds: u32) -> Result<(), DeviceError> {
        let response = self.send(&command::reboot(delay_seconds)).await?;
        section(&response, "system", "reboot")?;
        Ok(())
    }

    pub async fn set_wifi_credentials(
        &self,
        ssid: &str,
        psk: &str,
        key_type: u8,
    ) -> Result<(), DeviceError> {
        let response = self
            .send(&command::set_wifi_credentials(ssid, psk, key_type))
            .await?;
        section(&response, "netif", "set_stainfo")?;
        Ok(())
    }

    pub async fn set_cloud_server_url(&self, url: &str) -> Result<(), DeviceError> {
        let response = self.send(&command::set_cloud_server_url(url)).await?;
        section(&response, "cnCloud", "set_server_url")?;
        Ok(())
    }

    // -- Failsafe countdown --------------------------------------------------

    /// Delete countdown rules: strip-wide when no selector is given,
    /// scoped to one outlet otherwise.
    pub async fn clear_failsafe(
        &self,
        outlet: Option<&OutletSelector>,
    ) -> Result<(), DeviceError> {
        let cmd = match outlet {
            Some(sel) => {
                let id = self.resolve_outlet(sel)?;
                command::with_context(&[id], command::delete_all_countdown_rules())
            }
            None => command::delete_all_countdown_rules(),
        };
        let response = self.send(&cmd).await?;
        section(&response, "count_down", "delete_all_rules")?;
        Ok(())
    }

    /// Read back the countdown rules scoped to one outlet.
    pub async fn countdown_rules(
        &self,
        outlet: &OutletSelector,
    ) -> Result<Vec<CountdownRule>, DeviceError> {
        let id = self.resolve_outlet(outlet)?;
        let cmd = command::with_context(&[id], command::countdown_rules());
        let response = self.send(&cmd).await?;
        let sec = section(&response, "count_down", "get_rules")?;
        let rules = sec
            .get("rule_list")
            .ok_or_else(|| DeviceError::Protocol("get_rules lacks rule_list".into()))?;
        serde_json::from_value(rules.clone())
            .map_err(|e| DeviceError::Protocol(format!("bad rule_list: {e}")))
    }

    /// Delete one countdown rule by id, scoped to one outlet.
    pub async fn delete_countdown_rule(
        &self,
        outlet: &OutletSelector,
        rule_id: u32,
    ) -> Result<(), DeviceError> {
        let id = self.resolve_outlet(outlet)?;
        let cmd = command::with_context(&[id], command::delete_countdown_rule(rule_id));
        let response = self.send(&cmd).await?;
        section(&response, "count_down", "delete_rules")?;
        Ok(())
    }

    /// Install the device-side failsafe: after `delay_seconds` the device
    /// forces the outlet OFF on its own clock, regardless of whether this
    /// process is still alive. Existing rules are cleared first so there
    /// is never more than one active rule.
    pub async fn arm_failsafe(
        &self,
        outlet: &OutletSelector,
        delay_seconds: u32,
    ) -> Result<(), DeviceError> {
        self.clear_failsafe(Some(outlet)).await?;
        let id = self.resolve_outlet(outlet)?;
        let cmd = command::with_context(
            &[id],
            command::add_countdown_rule(true, delay_seconds, OutletState::Off, FAILSAFE_LABEL),
        );
        let response = self.send(&cmd).await?;
        section(&response, "count_down", "add_rule")?;
        Ok(())
    }

    /// Composite: clear failsafe, set the relay, arm the failsafe. On
    /// failure the whole sequence retries up to `max_retries` times; when
    /// that is exhausted the outlet is forced OFF and
    /// [`DeviceError::SafetyFallbackTriggered`] is returned: the pump is
    /// confirmed off rather than left under an unknown failsafe.
    pub async fn set_relay_state_timed(
        &self,
        outlet: &OutletSelector,
        state: OutletState,
        delay_seconds: u32,
        max_retries: u32,
    ) -> Result<(), DeviceError> {
        let mut attempt = 0;
        loop {
            let result = async {
                self.clear_failsafe(Some(outlet)).await?;
                self.set_relay_state(outlet, state).await?;
                self.arm_failsafe(outlet, delay_seconds).await
            }
            .await;

            match result {
                Ok(()) => return Ok(()),
                Err(e) if attempt < max_retries => {
                    attempt += 1;
                    warn!(
                        %outlet,
                        attempt,
                        max_retries,
                        "timed relay command failed, retrying: {e}"
                    );
                }
                Err(e) => {
                    warn!(%outlet, "timed relay command failed after retries, forcing off: {e}");
                    // If even this fails the transport error propagates;
                    // the caller must not be told the pump is off when the
                    // OFF command never went out.
                    self.set_relay_state(outlet, OutletState::Off).await?;
                    return Err(DeviceError::SafetyFallbackTriggered);
                }
            }
        }
    }

    // -- Plumbing -----------------------------------------------------------

    async fn send(&self, cmd: &Value) -> Result<Value, DeviceError> {
        Ok(self
            .transport
            .exchange(&cmd.to_string(), TransportMode::Stream)
            .await?)
    }
}

/// Pull `response[module][op]`, rejecting a missing section or a non-zero
/// `err_code`.
fn section<'a>(response: &'a Value, module: &str, op: &str) -> Result<&'a Value, DeviceError> {
    let sec = response
        .get(module)
        .and_then(|m| m.get(op))
        .ok_or_else(|| DeviceError::Protocol(format!("response lacks {module}.{op}")))?;
    match sec.get("err_code").and_then(Value::as_i64) {
        Some(0) | None => Ok(sec),
        Some(code) => Err(DeviceError::Protocol(format!(
            "{module}.{op} failed with err_code {code}"
        ))),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
