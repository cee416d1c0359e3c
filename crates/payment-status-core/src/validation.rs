//! Input checks run before any call to the node

use crate::{InvalidArgument, PaymentQuery};

/// Length of a payment hash rendered as hex
pub const PAYMENT_HASH_HEX_LEN: usize = 64;

pub fn validate_payment_hash(id: Option<&str>) -> Result<&str, InvalidArgument> {
    let id = match id {
        Some(id) if !id.is_empty() => id,
        _ => return Err(InvalidArgument::MissingPaymentHash),
    };

    if id.len() != PAYMENT_HASH_HEX_LEN || !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(InvalidArgument::MalformedPaymentHash);
    }

    Ok(id)
}

/// Validate a lookup query, returning the payment hash and session on success.
/// The hash is checked before the session.
pub fn validate_query<S>(query: &PaymentQuery<S>) -> Result<(&str, &S), InvalidArgument> {
    let id = validate_payment_hash(query.id.as_deref())?;
    let session = query
        .session
        .as_ref()
        .ok_or(InvalidArgument::MissingSession)?;

    Ok((id, session))
}
