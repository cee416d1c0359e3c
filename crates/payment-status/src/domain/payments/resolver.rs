use log::{debug, info, warn};
use payment_status_core::{
    classify_subscription_error, normalize_payment, validate_query, FailureReason,
    GetPaymentError, PaymentQuery, PaymentState, PaymentStatus, RawPaymentRecord,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::oneshot;

use super::settlement::Settlement;
use crate::infra::lightning::{PaymentTracker, StatusSignal, StatusUpdate};

pub type TrackingQuery = PaymentQuery<Arc<dyn PaymentTracker>>;

type Resolution = Result<PaymentStatus, GetPaymentError>;

/// Look up the status of a previously sent payment.
///
/// Opens one tracking subscription, settles on the first signal it emits
/// and releases the subscription. No retries: callers that want to poll
/// call this again.
pub async fn get_payment(query: TrackingQuery) -> Resolution {
    let (payment_hash, session) = validate_query(&query)?;
    debug!("Tracking payment {}", payment_hash);

    let mut subscription = session.track_payment(payment_hash).await.map_err(|e| {
        warn!("Failed to open payment tracking for {}: {}", payment_hash, e);
        classify_subscription_error(json!(e.to_string()))
    })?;

    let (handlers, outcome) = SignalHandlers::new(payment_hash);
    while !handlers.is_settled() {
        let signal = subscription.next_signal().await;
        handlers.dispatch(signal);
    }
    subscription.release();

    outcome
        .await
        .unwrap_or(Err(GetPaymentError::UnknownStatusOfPayment))
}

/// Handlers for the three subscription signals.
///
/// Whichever handler runs first settles the lookup, all later calls are
/// no-ops. Handlers may be called from several tasks at once.
pub struct SignalHandlers {
    payment_hash: String,
    settlement: Settlement<Resolution>,
}

impl SignalHandlers {
    pub fn new(payment_hash: &str) -> (Self, oneshot::Receiver<Resolution>) {
        let (settlement, outcome) = Settlement::new();
        let handlers = Self {
            payment_hash: payment_hash.to_string(),
            settlement,
        };
        (handlers, outcome)
    }

    pub fn is_settled(&self) -> bool {
        self.settlement.is_settled()
    }

    /// Returns true if this signal settled the lookup
    pub fn dispatch(&self, signal: StatusSignal) -> bool {
        match signal {
            StatusSignal::Data(update) => self.on_data(update),
            StatusSignal::Error(cause) => self.on_error(cause),
            StatusSignal::End => self.on_end(),
        }
    }

    pub fn on_data(&self, update: StatusUpdate) -> bool {
        if self.is_settled() {
            return false;
        }
        let resolution = status_from_update(&self.payment_hash, update);
        self.settlement.settle(resolution)
    }

    pub fn on_error(&self, cause: Value) -> bool {
        if self.is_settled() {
            return false;
        }
        let err = classify_subscription_error(cause);
        warn!("Tracking payment {} failed: {}", self.payment_hash, err);
        self.settlement.settle(Err(err))
    }

    pub fn on_end(&self) -> bool {
        if self.is_settled() {
            return false;
        }
        warn!(
            "Payment tracking for {} ended without a status",
            self.payment_hash
        );
        self.settlement
            .settle(Err(GetPaymentError::UnknownStatusOfPayment))
    }
}

fn status_from_update(payment_hash: &str, update: StatusUpdate) -> Resolution {
    match update.status {
        PaymentState::InFlight => {
            debug!("Payment {} is in flight", payment_hash);
            Ok(PaymentStatus::Pending)
        }
        PaymentState::Succeeded => {
            let record = RawPaymentRecord::from_value(&update.record)?;
            let payment = normalize_payment(&record, payment_hash)?;
            info!("Payment {} succeeded", payment_hash);
            Ok(PaymentStatus::Confirmed(payment))
        }
        PaymentState::Failed | PaymentState::Other(_) => {
            let reason = FailureReason::from_node_reason(update.failure_reason.as_deref());
            info!("Payment {} failed: {:?}", payment_hash, reason);
            Ok(PaymentStatus::Failed(reason))
        }
    }
}
