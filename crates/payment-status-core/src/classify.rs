//! Maps raw subscription failures onto stable error kinds.
//!
//! The node has no structured error codes for payment tracking, so the one
//! failure we recognize is matched on its text. Everything else is passed
//! through untouched as an unexpected error.

use serde_json::Value;

use crate::GetPaymentError;

/// Text LND reports when asked to track a hash it never sent a payment for
pub const PAYMENT_NOT_INITIATED: &str = "payment isn't initiated";

// gRPC surfaces the text as `details`, the REST gateway as `message`
const DETAIL_FIELDS: [&str; 2] = ["details", "message"];

pub fn classify_subscription_error(cause: Value) -> GetPaymentError {
    let not_initiated = DETAIL_FIELDS
        .iter()
        .filter_map(|field| cause.get(field).and_then(Value::as_str))
        .any(|detail| detail.contains(PAYMENT_NOT_INITIATED));

    if not_initiated {
        GetPaymentError::SentPaymentNotFound
    } else {
        GetPaymentError::UnexpectedGetPaymentError { err: cause }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_not_initiated_details_is_not_found() {
        let err = classify_subscription_error(json!({ "details": "payment isn't initiated" }));
        assert_eq!(err, GetPaymentError::SentPaymentNotFound);
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_rest_gateway_message_is_not_found() {
        let err = classify_subscription_error(json!({
            "code": 5,
            "message": "payment isn't initiated",
            "details": [],
        }));
        assert_eq!(err, GetPaymentError::SentPaymentNotFound);
    }

    #[test]
    fn test_other_errors_keep_the_cause() {
        let err = classify_subscription_error(json!("err"));
        assert_eq!(
            err,
            GetPaymentError::UnexpectedGetPaymentError { err: json!("err") }
        );
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let err = classify_subscription_error(json!({ "details": "Payment Isn't Initiated" }));
        assert_eq!(err.code(), "UnexpectedGetPaymentError");
    }

    #[test]
    fn test_bare_string_is_opaque() {
        let err = classify_subscription_error(json!("payment isn't initiated"));
        assert_eq!(err.code(), "UnexpectedGetPaymentError");
    }
}
