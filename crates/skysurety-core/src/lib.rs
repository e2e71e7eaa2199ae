// === Shared Identity & Status Types ===
pub mod types;

// === Protocol Parameters ===
pub mod params;

// === Ledger Events ===
pub mod events;

// === Re-exports for broader ecosystem access ===
pub use types::{Address, FlightStatus, RequestKey};
pub use params::{ParamsError, ProtocolParams, UNIT};
pub use events::LedgerEvent;
