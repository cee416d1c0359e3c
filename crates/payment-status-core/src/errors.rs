//! Errors surfaced when resolving a payment status

use serde_json::{json, Value};
use thiserror::Error;

/// Local input problems, detected before any subscription is opened
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidArgument {
    #[error("missing payment hash")]
    MissingPaymentHash,
    #[error("payment hash must be 32 bytes of hex")]
    MalformedPaymentHash,
    #[error("missing session handle")]
    MissingSession,
}

impl InvalidArgument {
    pub fn code(&self) -> &'static str {
        match self {
            InvalidArgument::MissingPaymentHash | InvalidArgument::MalformedPaymentHash => {
                "ExpectedPaymentHashToLookupPastPaymentStatus"
            }
            InvalidArgument::MissingSession => "ExpectedSessionToLookupPayment",
        }
    }
}

/// Every way a payment status lookup can be rejected.
///
/// Consumers should branch on [`GetPaymentError::code`], which is stable,
/// rather than on the display text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GetPaymentError {
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] InvalidArgument),

    #[error("sent payment not found")]
    SentPaymentNotFound,

    #[error("unexpected error getting payment: {err}")]
    UnexpectedGetPaymentError { err: Value },

    #[error("subscription ended without a payment status")]
    UnknownStatusOfPayment,

    #[error("unexpected payment record at `{field}`: {reason}")]
    UnexpectedNormalizationError { field: String, reason: String },
}

impl GetPaymentError {
    /// HTTP-like class of the failure: 400 bad input, 404 unknown payment,
    /// 503 anything the node did unexpectedly
    pub fn status_code(&self) -> u16 {
        match self {
            GetPaymentError::InvalidArgument(_) => 400,
            GetPaymentError::SentPaymentNotFound => 404,
            GetPaymentError::UnexpectedGetPaymentError { .. }
            | GetPaymentError::UnknownStatusOfPayment
            | GetPaymentError::UnexpectedNormalizationError { .. } => 503,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GetPaymentError::InvalidArgument(invalid) => invalid.code(),
            GetPaymentError::SentPaymentNotFound => "SentPaymentNotFound",
            GetPaymentError::UnexpectedGetPaymentError { .. } => "UnexpectedGetPaymentError",
            GetPaymentError::UnknownStatusOfPayment => "UnknownStatusOfPayment",
            GetPaymentError::UnexpectedNormalizationError { .. } => {
                "UnexpectedNormalizationError"
            }
        }
    }

    /// Diagnostic payload attached to the rejection, if any
    pub fn details(&self) -> Option<Value> {
        match self {
            GetPaymentError::UnexpectedGetPaymentError { err } => Some(json!({ "err": err })),
            GetPaymentError::UnexpectedNormalizationError { field, reason } => {
                Some(json!({ "field": field, "reason": reason }))
            }
            _ => None,
        }
    }

    pub(crate) fn normalization(field: impl Into<String>, reason: impl ToString) -> Self {
        GetPaymentError::UnexpectedNormalizationError {
            field: field.into(),
            reason: reason.to_string(),
        }
    }
}
