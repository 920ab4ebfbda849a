//! # wmodem
//!
//! Process-level wiring for the modem manager: configuration, logging,
//! built-in sinks and the simulated hardware used by `--simulate`.
//!
//! The building blocks live in the member crates and are re-exported here.

pub mod config;
pub mod logging;
pub mod simulate;
pub mod sinks;

pub use wmodem_events as events;
pub use wmodem_pdu::pdu;
pub use wmodem_serial::serial;
