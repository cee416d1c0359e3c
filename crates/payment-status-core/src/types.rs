//! Canonical payment types returned to callers

use serde::{Deserialize, Serialize, Serializer};

/// Input to a payment status lookup.
///
/// Generic over the session type so this crate never depends on a
/// particular transport. Both fields are optional here because their
/// absence is reported as a validation failure, not a type error.
#[derive(Debug, Clone)]
pub struct PaymentQuery<S> {
    /// Payment hash as 64 hex characters
    pub id: Option<String>,
    /// Connection to the routing node
    pub session: Option<S>,
}

impl<S> PaymentQuery<S> {
    pub fn new(id: impl Into<String>, session: S) -> Self {
        Self {
            id: Some(id.into()),
            session: Some(session),
        }
    }
}

/// Payment state reported by the node on a tracking update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentState {
    InFlight,
    Succeeded,
    Failed,
    Other(String),
}

impl From<&str> for PaymentState {
    fn from(status: &str) -> Self {
        match status {
            "IN_FLIGHT" => PaymentState::InFlight,
            "SUCCEEDED" => PaymentState::Succeeded,
            "FAILED" => PaymentState::Failed,
            other => PaymentState::Other(other.to_string()),
        }
    }
}

/// One channel traversal along a payment path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    /// Channel id formatted as `<block>x<index>x<output>`
    pub channel: String,
    pub channel_capacity: u64,
    pub fee: u64,
    pub fee_mtokens: String,
    pub forward: u64,
    pub forward_mtokens: String,
    pub public_key: String,
    /// Absolute block height at which the hop's HTLC expires
    pub timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPath {
    pub fee: u64,
    pub fee_mtokens: String,
    pub hops: Vec<Hop>,
    pub mtokens: String,
    pub safe_fee: u64,
    pub safe_tokens: u64,
    pub timeout: u64,
    pub tokens: u64,
}

/// A settled payment, identical whichever record shape the node sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub fee: u64,
    pub fee_mtokens: String,
    /// Same as `paths[0].hops`
    pub hops: Vec<Hop>,
    pub id: String,
    pub mtokens: String,
    pub paths: Vec<PaymentPath>,
    pub safe_fee: u64,
    pub safe_tokens: u64,
    /// Preimage in lowercase hex, absent until the payment has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub timeout: u64,
    pub tokens: u64,
}

impl Payment {
    /// Builds a single-path payment, lifting the path totals to the top level
    pub fn from_path(id: String, secret: Option<String>, path: PaymentPath) -> Self {
        Self {
            fee: path.fee,
            fee_mtokens: path.fee_mtokens.clone(),
            hops: path.hops.clone(),
            id,
            mtokens: path.mtokens.clone(),
            safe_fee: path.safe_fee,
            safe_tokens: path.safe_tokens,
            secret,
            timeout: path.timeout,
            tokens: path.tokens,
            paths: vec![path],
        }
    }
}

/// Why a payment failed, when the node says
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureReason {
    #[default]
    Unknown,
    InsufficientBalance,
    InvalidPayment,
    PathfindingTimeout,
    RouteNotFound,
}

impl FailureReason {
    /// Maps LND's `failure_reason` enum text, anything unrecognized is `Unknown`
    pub fn from_node_reason(reason: Option<&str>) -> Self {
        match reason {
            Some("FAILURE_REASON_INSUFFICIENT_BALANCE") => FailureReason::InsufficientBalance,
            Some("FAILURE_REASON_INCORRECT_PAYMENT_DETAILS") => FailureReason::InvalidPayment,
            Some("FAILURE_REASON_TIMEOUT") => FailureReason::PathfindingTimeout,
            Some("FAILURE_REASON_NO_ROUTE") => FailureReason::RouteNotFound,
            _ => FailureReason::Unknown,
        }
    }
}

#[derive(Serialize)]
struct FailureFlags {
    is_insufficient_balance: bool,
    is_invalid_payment: bool,
    is_pathfinding_timeout: bool,
    is_route_not_found: bool,
}

impl Serialize for FailureReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        FailureFlags {
            is_insufficient_balance: *self == FailureReason::InsufficientBalance,
            is_invalid_payment: *self == FailureReason::InvalidPayment,
            is_pathfinding_timeout: *self == FailureReason::PathfindingTimeout,
            is_route_not_found: *self == FailureReason::RouteNotFound,
        }
        .serialize(serializer)
    }
}

/// Resolved outcome of a payment status lookup.
///
/// Serializes to `{failed?, is_confirmed, is_failed, is_pending, payment?}`
/// where exactly one flag is true and `payment` is present only when
/// confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Confirmed(Payment),
    Failed(FailureReason),
}

impl PaymentStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, PaymentStatus::Pending)
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, PaymentStatus::Confirmed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PaymentStatus::Failed(_))
    }

    pub fn payment(&self) -> Option<&Payment> {
        match self {
            PaymentStatus::Confirmed(payment) => Some(payment),
            _ => None,
        }
    }

    pub fn failed(&self) -> Option<FailureReason> {
        match self {
            PaymentStatus::Failed(reason) => Some(*reason),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct PaymentStatusFlags<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    failed: Option<FailureReason>,
    is_confirmed: bool,
    is_failed: bool,
    is_pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment: Option<&'a Payment>,
}

impl Serialize for PaymentStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PaymentStatusFlags {
            failed: self.failed(),
            is_confirmed: self.is_confirmed(),
            is_failed: self.is_failed(),
            is_pending: self.is_pending(),
            payment: self.payment(),
        }
        .serialize(serializer)
    }
}
