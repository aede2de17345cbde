//! Pay-per-request HTTP gateway built on the [x402 protocol](https://www.x402.org).
//!
//! A priced endpoint answers `402 Payment Required` with the payment terms. The client signs
//! an EIP-3009 `transferWithAuthorization` for USDC off-chain and retries with the signed
//! authorization in the `X-PAYMENT` header. The gateway verifies it against the terms and,
//! holding a merchant key, submits the transfer itself, paying the gas. The payer never sends
//! a transaction.
//!
//! # Modules
//!
//! - [`chain`]: the [`StablecoinLedger`](chain::StablecoinLedger) seam and its live EVM
//!   implementation, one signing provider per network.
//! - [`config`]: configuration file, environment fallbacks and the merchant key.
//! - [`handlers`]: HTTP endpoints and the payment gate middleware.
//! - [`networks`]: the supported networks and their USDC deployments.
//! - [`payment_link`]: stateless shareable payment requests.
//! - [`proto`]: x402 v1 wire types and the `X-PAYMENT` header codec.
//! - [`requirements`]: the payment terms a priced resource declares.
//! - [`settlement`]: verification and settlement of payments, live or simulated.
//! - [`signature`]: splitting a 65-byte signature into `v`, `r` and `s`.
//! - [`timestamp`]: Unix timestamps of authorization validity windows.
//! - [`util`]: base64, human-readable amounts, telemetry and signal handling.
//!
//! Without a merchant key the gateway runs in demo mode: payments are verified the same way
//! but never submitted, and settle with a synthetic `demo_` transaction id.

pub mod chain;
pub mod config;
pub mod handlers;
pub mod networks;
pub mod payment_link;
pub mod proto;
pub mod requirements;
pub mod settlement;
pub mod signature;
pub mod timestamp;
pub mod util;
