//! payment-status-core: Transport-free pieces of payment status resolution
//!
//! This crate holds the canonical payment types, input validation, the
//! wire record normalizer and the subscription error classifier. Nothing
//! here performs I/O.

pub mod classify;
pub mod errors;
pub mod normalize;
pub mod types;
pub mod validation;

pub use classify::*;
pub use errors::*;
pub use normalize::*;
pub use types::*;
pub use validation::*;
