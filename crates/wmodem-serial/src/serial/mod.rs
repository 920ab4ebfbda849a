//! Serial crate: sub-modules.

pub mod error;
pub mod types;
pub mod config;
pub mod transport;
pub mod native;
pub mod simulator;
pub mod at;
pub mod engine;
pub mod device;
pub mod port_scanner;
pub mod sink;
pub mod registry;

// Re-export top-level items for convenience.
pub use config::ModemConfig;
pub use device::Device;
pub use engine::{AtEngine, EngineEvent, EventHandler};
pub use error::{ModemError, ModemErrorKind, ModemResult};
pub use native::{NativeOpener, NativeTransport};
pub use registry::DeviceRegistry;
pub use simulator::{ModemSimulator, SimulatorOpener};
pub use sink::SmsSink;
pub use transport::{PortOpener, SerialTransport, SimulatedTransport};
pub use types::*;
