use anyhow::anyhow;
use payment_status::{
    get_payment, FailureReason, GetPaymentError, Hop, PaymentQuery, PaymentStatus,
    PaymentTracker, StatusSignal, TrackingQuery,
};
use serde_json::json;
use std::sync::Arc;

use crate::helpers::{
    data, init_logger, legacy_confirmed, payment_hash, query_with, tracker_emitting, MockTracker,
};

#[tokio::test]
async fn test_missing_payment_hash_never_subscribes() {
    init_logger();
    let mut tracker = MockTracker::new();
    tracker.expect_track_payment().never();
    let session: Arc<dyn PaymentTracker> = Arc::new(tracker);

    let err = get_payment(PaymentQuery {
        id: None,
        session: Some(session),
    })
    .await
    .unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert_eq!(err.code(), "ExpectedPaymentHashToLookupPastPaymentStatus");
    assert_eq!(err.to_string(), "invalid argument: missing payment hash");
}

#[tokio::test]
async fn test_missing_session_is_rejected() {
    init_logger();
    let query: TrackingQuery = PaymentQuery {
        id: Some(payment_hash()),
        session: None,
    };

    let err = get_payment(query).await.unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert_eq!(err.code(), "ExpectedSessionToLookupPayment");
    assert_eq!(err.to_string(), "invalid argument: missing session handle");
}

#[tokio::test]
async fn test_in_flight_payment_is_pending() {
    init_logger();
    let (tracker, released) = tracker_emitting(vec![data(json!({
        "status": "IN_FLIGHT",
        "htlcs": [],
    }))]);

    let status = get_payment(query_with(tracker)).await.unwrap();

    assert_eq!(status, PaymentStatus::Pending);
    assert_eq!(
        serde_json::to_value(&status).unwrap(),
        json!({ "is_confirmed": false, "is_failed": false, "is_pending": true })
    );
    assert!(released.is_cancelled());
}

#[tokio::test]
async fn test_payment_not_initiated_is_not_found() {
    init_logger();
    let (tracker, released) = tracker_emitting(vec![StatusSignal::Error(json!({
        "details": "payment isn't initiated",
    }))]);

    let err = get_payment(query_with(tracker)).await.unwrap_err();

    assert_eq!(err, GetPaymentError::SentPaymentNotFound);
    assert_eq!((err.status_code(), err.code()), (404, "SentPaymentNotFound"));
    assert!(released.is_cancelled());
}

#[tokio::test]
async fn test_unexpected_error_is_returned() {
    init_logger();
    let (tracker, _) = tracker_emitting(vec![StatusSignal::Error(json!("err"))]);

    let err = get_payment(query_with(tracker)).await.unwrap_err();

    assert_eq!(
        (err.status_code(), err.code(), err.details()),
        (503, "UnexpectedGetPaymentError", Some(json!({ "err": "err" })))
    );
}

#[tokio::test]
async fn test_end_without_status_is_unknown() {
    init_logger();
    let (tracker, released) = tracker_emitting(vec![StatusSignal::End]);

    let err = get_payment(query_with(tracker)).await.unwrap_err();

    assert_eq!(
        (err.status_code(), err.code()),
        (503, "UnknownStatusOfPayment")
    );
    assert!(released.is_cancelled());
}

#[tokio::test]
async fn test_closed_subscription_is_unknown() {
    init_logger();
    let (tracker, _) = tracker_emitting(vec![]);

    let err = get_payment(query_with(tracker)).await.unwrap_err();

    assert_eq!(err, GetPaymentError::UnknownStatusOfPayment);
}

#[tokio::test]
async fn test_confirmed_legacy_payment() {
    init_logger();
    let (tracker, released) = tracker_emitting(vec![data(legacy_confirmed())]);

    let status = get_payment(query_with(tracker)).await.unwrap();

    assert!(status.is_confirmed());
    assert!(!status.is_pending());
    assert!(!status.is_failed());
    let payment = status.payment().unwrap();
    assert_eq!(
        payment.hops,
        vec![Hop {
            channel: "0x0x1".to_string(),
            channel_capacity: 1,
            fee: 0,
            fee_mtokens: "1".to_string(),
            forward: 0,
            forward_mtokens: "1".to_string(),
            public_key: "b".to_string(),
            timeout: 1,
        }]
    );
    assert_eq!(payment.id, payment_hash());
    assert_eq!(payment.tokens, 0);
    assert_eq!(payment.safe_tokens, 1);
    assert_eq!(payment.fee, 0);
    assert_eq!(payment.fee_mtokens, "1");
    assert_eq!(payment.mtokens, "1");
    assert_eq!(payment.secret, None);
    assert!(released.is_cancelled());
}

#[tokio::test]
async fn test_failed_payment() {
    init_logger();
    let (tracker, _) = tracker_emitting(vec![data(json!({ "status": "FAILED" }))]);

    let status = get_payment(query_with(tracker)).await.unwrap();

    assert_eq!(status, PaymentStatus::Failed(FailureReason::Unknown));
    let value = serde_json::to_value(&status).unwrap();
    assert_eq!(value["is_failed"], json!(true));
    assert!(value.get("payment").is_none());
}

#[tokio::test]
async fn test_first_signal_wins() {
    init_logger();
    let (tracker, _) = tracker_emitting(vec![
        data(json!({ "status": "IN_FLIGHT" })),
        StatusSignal::Error(json!("err")),
        data(legacy_confirmed()),
        StatusSignal::End,
    ]);

    let status = get_payment(query_with(tracker)).await.unwrap();

    assert_eq!(status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_open_failure_is_unexpected() {
    init_logger();
    let mut tracker = MockTracker::new();
    tracker
        .expect_track_payment()
        .times(1)
        .returning(|_| Err(anyhow!("connection refused")));

    let err = get_payment(query_with(tracker)).await.unwrap_err();

    assert_eq!(
        err,
        GetPaymentError::UnexpectedGetPaymentError {
            err: json!("connection refused")
        }
    );
}
