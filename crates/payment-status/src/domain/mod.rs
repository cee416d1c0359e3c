pub mod payments;

pub use payments::*;
