mod resolver;
mod settlement;

pub use resolver::{get_payment, SignalHandlers, TrackingQuery};
pub use settlement::Settlement;
