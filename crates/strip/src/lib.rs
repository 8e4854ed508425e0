//! Protocol client for a Kasa-family multi-outlet smart power strip:
//! XOR-obfuscated JSON commands over per-call TCP or UDP exchanges, with a
//! session layer that caches the strip's identity and outlet topology and
//! exposes relay control, metering, and the device-resident countdown
//! failsafe.

pub mod cipher;
pub mod command;
pub mod error;
pub mod session;
pub mod transport;

pub use command::OutletState;
pub use error::{DeviceError, TransportError};
pub use session::{
    CountdownRule, DailyEnergy, EnergySnapshot, OutletInfo, OutletSelector, Session,
};
pub use transport::{NetTransport, Transport, TransportMode};
