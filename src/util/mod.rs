//! Helpers shared across the crate.
//!
//! - [`b64`] - Base64 encoding/decoding
//! - [`money_amount`] - Human-readable stablecoin amounts
//! - [`sig_down`] - Graceful shutdown signal handling
//! - [`telemetry`] - Logging and OpenTelemetry setup

pub mod b64;
pub mod money_amount;
pub mod sig_down;
pub mod telemetry;

pub use b64::*;
pub use money_amount::*;
pub use sig_down::*;
pub use telemetry::*;
