pub mod config;
pub mod domain;
pub mod infra;

pub use config::*;
pub use domain::{get_payment, Settlement, SignalHandlers, TrackingQuery};
pub use infra::lightning::*;
pub use payment_status_core::*;
