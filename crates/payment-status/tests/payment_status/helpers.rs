use async_trait::async_trait;
use mockall::mock;
use payment_status::{
    PaymentQuery, PaymentTracker, StatusSignal, StatusUpdate, Subscription, TrackingQuery,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mock! {
    pub Tracker { }

    #[async_trait]
    impl PaymentTracker for Tracker {
        async fn track_payment(&self, payment_hash: &str) -> Result<Subscription, anyhow::Error>;
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn payment_hash() -> String {
    "00".repeat(32)
}

/// A subscription that replays `signals` and then closes
pub fn scripted_subscription(signals: Vec<StatusSignal>) -> (Subscription, CancellationToken) {
    let (tx, subscription) = Subscription::channel(signals.len().max(1));
    for signal in signals {
        tx.try_send(signal).expect("buffer sized for every signal");
    }
    let token = subscription.cancel_token();
    (subscription, token)
}

/// A tracker expected to be opened exactly once for `payment_hash()`
pub fn tracker_emitting(signals: Vec<StatusSignal>) -> (MockTracker, CancellationToken) {
    let (subscription, token) = scripted_subscription(signals);
    let mut tracker = MockTracker::new();
    tracker
        .expect_track_payment()
        .withf(|hash| hash == payment_hash())
        .times(1)
        .return_once(move |_| Ok(subscription));
    (tracker, token)
}

pub fn query_with(tracker: MockTracker) -> TrackingQuery {
    let session: Arc<dyn PaymentTracker> = Arc::new(tracker);
    PaymentQuery::new(payment_hash(), session)
}

pub fn data(record: Value) -> StatusSignal {
    StatusSignal::Data(StatusUpdate::from_value(record))
}

pub fn legacy_confirmed() -> Value {
    json!({
        "status": "SUCCEEDED",
        "htlcs": [],
        "preimage": "00".repeat(32),
        "route": {
            "hops": [{
                "amt_to_forward_msat": "1",
                "chan_capacity": "1",
                "chan_id": "1",
                "expiry": 1,
                "fee_msat": "1",
                "pub_key": "b",
            }],
            "total_amt_msat": "1",
            "total_fees_msat": "1",
            "total_time_lock": 1,
        },
        "state": "SUCCEEDED",
    })
}
