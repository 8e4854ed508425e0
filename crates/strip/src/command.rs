//! Command payload construction. Every device operation maps to a nested
//! JSON tree built here and serialized at the transport boundary. No
//! string assembly: aliases and SSIDs containing quotes are escaped by
//! the serializer rather than corrupting the frame.

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};

use crate::error::DeviceError;

// ---------------------------------------------------------------------------
// Outlet state
// ---------------------------------------------------------------------------

/// Relay state of one outlet. On the wire this is an integer: 1 = ON,
/// 0 = OFF, except the LED command which inverts it (`off: 1` means the
/// indicator LEDs are dark; device quirk, preserved as-is).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutletState {
    On,
    Off,
}

impl OutletState {
    /// Integer the relay and countdown commands carry.
    pub fn wire(self) -> u8 {
        match self {
            Self::On => 1,
            Self::Off => 0,
        }
    }

    /// Inverted integer for `set_led_off`.
    pub fn led_wire(self) -> u8 {
        match self {
            Self::On => 0,
            Self::Off => 1,
        }
    }
}

impl FromStr for OutletState {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            other => Err(DeviceError::InvalidState(other.to_string())),
        }
    }
}

impl fmt::Display for OutletState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
        }
    }
}

// ---------------------------------------------------------------------------
// Whole-strip commands
// ---------------------------------------------------------------------------

pub fn sysinfo() -> Value {
    json!({"system": {"get_sysinfo": {}}})
}

pub fn set_wifi_credentials(ssid: &str, psk: &str, key_type: u8) -> Value {
    json!({"netif": {"set_stainfo": {"ssid": ssid, "password": psk, "key_type": key_type}}})
}

pub fn set_cloud_server_url(url: &str) -> Value {
    json!({"cnCloud": {"set_server_url": {"server": url}}})
}

pub fn set_led_state(state: OutletState) -> Value {
    json!({"system": {"set_led_off": {"off": state.led_wire()}}})
}

pub fn reboot(delay_seconds: u32) -> Value {
    json!({"system": {"reboot": {"delay": delay_seconds}}})
}

// ---------------------------------------------------------------------------
// Outlet-scoped command bodies (wrap with `with_context` to address outlets)
// ---------------------------------------------------------------------------

pub fn realtime_energy() -> Value {
    json!({"emeter": {"get_realtime": {}}})
}

pub fn daily_energy(month: u8, year: u16) -> Value {
    json!({"emeter": {"get_daystat": {"month": month, "year": year}}})
}

pub fn set_alias(name: &str) -> Value {
    json!({"system": {"set_dev_alias": {"alias": name}}})
}

pub fn set_relay_state(state: OutletState) -> Value {
    json!({"system": {"set_relay_state": {"state": state.wire()}}})
}

pub fn add_countdown_rule(enabled: bool, delay_seconds: u32, action: OutletState, label: &str) -> Value {
    json!({"count_down": {"add_rule": {
        "enable": if enabled { 1 } else { 0 },
        "delay": delay_seconds,
        "act": action.wire(),
        "name": label,
    }}})
}

pub fn countdown_rules() -> Value {
    json!({"count_down": {"get_rules": null}})
}

pub fn delete_all_countdown_rules() -> Value {
    json!({"count_down": {"delete_all_rules": null}})
}

pub fn delete_countdown_rule(id: u32) -> Value {
    json!({"count_down": {"delete_rules": {"id": id}}})
}

// ---------------------------------------------------------------------------
// Context envelope
// ---------------------------------------------------------------------------

/// Scope `body` to the given outlet ids. Whole-strip commands skip the
/// envelope entirely; an addressed command carries its targets in
/// `context.child_ids` alongside the body's own top-level key.
pub fn with_context(outlet_ids: &[String], body: Value) -> Value {
    let mut wrapped = body;
    if let Value::Object(map) = &mut wrapped {
        map.insert("context".to_string(), json!({"child_ids": outlet_ids}));
    }
    wrapped
}

// ===========================================================================
// Tests
// ===========================================================================
