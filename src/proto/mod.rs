//! x402 protocol types.
//!
//! Only protocol version 1 with the `exact` scheme on EVM networks is spoken here.
//! [`v1`] holds the wire types and [`header`] the `X-PAYMENT` header codec.

pub mod header;
pub mod v1;

pub use header::{DecodeError, PAYMENT_HEADER, PAYMENT_RESPONSE_HEADER};
pub use v1::{
    Authorization, AuthorizationNonce, ExactEvmPayload, ExactScheme, PaymentPayload,
    PaymentRequirements, PaymentRequirementsExtra, TokenAmount, X402Version1,
};
