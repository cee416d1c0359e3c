use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};
use tokio::sync::oneshot;

/// Single-assignment slot: the first `settle` wins, every later call is a no-op.
///
/// Safe to share between tasks; the winner is decided by an atomic
/// compare-and-swap before the value is handed to the receiver.
pub struct Settlement<T> {
    settled: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Settlement<T> {
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let settlement = Self {
            settled: AtomicBool::new(false),
            sender: Mutex::new(Some(tx)),
        };
        (settlement, rx)
    }

    /// Returns true if this call settled the slot
    pub fn settle(&self, value: T) -> bool {
        if self
            .settled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let sender = match self.sender.lock() {
            Ok(mut sender) => sender.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(sender) = sender {
            // receiver gone means the caller stopped waiting
            let _ = sender.send(value);
        }
        true
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }
}
