//! Normalizes the node's payment records into [`Payment`].
//!
//! Two record shapes reach us. The legacy shape carries a single `route`
//! with millisatoshi strings and integer channel ids. The modern shape
//! carries a `payment` object with one `path` already in canonical field
//! names. Both produce the same `Payment`.

use base64::Engine;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{GetPaymentError, Hop, Payment, PaymentPath};

const MTOKENS_PER_TOKEN: u64 = 1000;
const PREIMAGE_LEN: usize = 32;

const LEGACY_FIELDS: [&str; 3] = ["route", "htlcs", "preimage"];
const MODERN_FIELDS: [&str; 2] = ["payment", "path"];

/// Integer as the node renders it: LND's REST gateway quotes 64-bit values
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WireNumber {
    Number(u64),
    Text(String),
}

impl WireNumber {
    fn parse(&self, field: &str) -> Result<u64, GetPaymentError> {
        match self {
            WireNumber::Number(value) => Ok(*value),
            WireNumber::Text(text) => text
                .parse::<u64>()
                .map_err(|e| GetPaymentError::normalization(field, format!("{:?}: {}", text, e))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyPaymentRecord {
    #[serde(default)]
    pub htlcs: Vec<Value>,
    /// Hex or base64, all zero when not yet known
    #[serde(default)]
    pub preimage: Option<String>,
    pub route: LegacyRoute,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyRoute {
    pub hops: Vec<LegacyHop>,
    pub total_amt_msat: WireNumber,
    pub total_fees_msat: WireNumber,
    pub total_time_lock: WireNumber,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyHop {
    pub amt_to_forward_msat: WireNumber,
    pub chan_capacity: WireNumber,
    pub chan_id: WireNumber,
    pub expiry: WireNumber,
    pub fee_msat: WireNumber,
    pub pub_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModernPaymentRecord {
    pub id: String,
    #[serde(default)]
    pub secret: Option<String>,
    pub payment: ModernPayment,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModernPayment {
    pub fee_mtokens: WireNumber,
    pub path: ModernPath,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModernPath {
    pub hops: Vec<ModernHop>,
    pub mtokens: WireNumber,
    pub timeout: WireNumber,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModernHop {
    pub channel: String,
    pub channel_capacity: WireNumber,
    pub fee_mtokens: WireNumber,
    pub forward_mtokens: WireNumber,
    pub public_key: String,
    pub timeout: WireNumber,
}

/// A payment record in whichever shape the node sent it
#[derive(Debug, Clone)]
pub enum RawPaymentRecord {
    Legacy(LegacyPaymentRecord),
    Modern(ModernPaymentRecord),
}

impl RawPaymentRecord {
    /// Picks the record shape from its top-level fields, then parses it
    pub fn from_value(value: &Value) -> Result<Self, GetPaymentError> {
        let Some(fields) = value.as_object() else {
            return Err(GetPaymentError::normalization(
                "record",
                "expected a JSON object",
            ));
        };

        if LEGACY_FIELDS.iter().any(|field| fields.contains_key(*field)) {
            return parse_record(value).map(RawPaymentRecord::Legacy);
        }

        if MODERN_FIELDS.iter().any(|field| fields.contains_key(*field)) {
            return parse_record(value).map(RawPaymentRecord::Modern);
        }

        Err(GetPaymentError::normalization(
            "record",
            "neither a route nor a payment path is present",
        ))
    }
}

/// Deserializes a record, reporting failures against the offending field path
fn parse_record<T: DeserializeOwned>(value: &Value) -> Result<T, GetPaymentError> {
    serde_path_to_error::deserialize(value).map_err(|e| {
        let path = e.path().to_string();
        let reason = e.inner().to_string();
        // serde reports a missing field on its parent, so append the name
        let field = match (missing_field(&reason), path.as_str()) {
            (Some(missing), ".") => missing.to_string(),
            (Some(missing), _) => format!("{}.{}", path, missing),
            (None, ".") => "record".to_string(),
            (None, _) => path,
        };
        GetPaymentError::normalization(field, reason)
    })
}

fn missing_field(reason: &str) -> Option<&str> {
    reason.strip_prefix("missing field `")?.split('`').next()
}

/// Normalize a record into a `Payment`.
///
/// `payment_hash` is the hash being tracked. The legacy shape has no id of
/// its own, so it is used when the preimage is not yet known.
pub fn normalize_payment(
    record: &RawPaymentRecord,
    payment_hash: &str,
) -> Result<Payment, GetPaymentError> {
    match record {
        RawPaymentRecord::Legacy(record) => normalize_legacy(record, payment_hash),
        RawPaymentRecord::Modern(record) => normalize_modern(record),
    }
}

/// Formats a packed short channel id as `<block>x<index>x<output>`
pub fn format_channel_id(id: u64) -> String {
    let block = id >> 40;
    let index = (id >> 16) & 0xFF_FFFF;
    let output = id & 0xFFFF;
    format!("{}x{}x{}", block, index, output)
}

#[derive(Debug, Clone, Copy)]
struct MilliTokens(u64);

impl MilliTokens {
    fn parse(raw: &WireNumber, field: &str) -> Result<Self, GetPaymentError> {
        raw.parse(field).map(MilliTokens)
    }

    fn tokens(self) -> u64 {
        self.0 / MTOKENS_PER_TOKEN
    }

    fn safe_tokens(self) -> u64 {
        self.0.div_ceil(MTOKENS_PER_TOKEN)
    }

    fn mtokens(self) -> String {
        self.0.to_string()
    }
}

fn build_path(
    hops: Vec<Hop>,
    mtokens: MilliTokens,
    fee: MilliTokens,
    timeout: u64,
) -> PaymentPath {
    PaymentPath {
        fee: fee.tokens(),
        fee_mtokens: fee.mtokens(),
        hops,
        mtokens: mtokens.mtokens(),
        safe_fee: fee.safe_tokens(),
        safe_tokens: mtokens.safe_tokens(),
        timeout,
        tokens: mtokens.tokens(),
    }
}

fn normalize_legacy(
    record: &LegacyPaymentRecord,
    payment_hash: &str,
) -> Result<Payment, GetPaymentError> {
    let route = &record.route;
    let hops = route
        .hops
        .iter()
        .enumerate()
        .map(|(index, hop)| legacy_hop(hop, &format!("route.hops[{}]", index)))
        .collect::<Result<Vec<_>, _>>()?;

    let path = build_path(
        hops,
        MilliTokens::parse(&route.total_amt_msat, "route.total_amt_msat")?,
        MilliTokens::parse(&route.total_fees_msat, "route.total_fees_msat")?,
        route.total_time_lock.parse("route.total_time_lock")?,
    );

    let preimage = record
        .preimage
        .as_deref()
        .map(|raw| decode_secret(raw, "preimage"))
        .transpose()?
        .flatten();

    let id = match &preimage {
        Some(preimage) => hex::encode(Sha256::digest(preimage)),
        None => payment_hash.to_lowercase(),
    };

    Ok(Payment::from_path(id, preimage.map(hex::encode), path))
}

fn legacy_hop(hop: &LegacyHop, field: &str) -> Result<Hop, GetPaymentError> {
    let forward = MilliTokens::parse(
        &hop.amt_to_forward_msat,
        &format!("{}.amt_to_forward_msat", field),
    )?;
    let fee = MilliTokens::parse(&hop.fee_msat, &format!("{}.fee_msat", field))?;

    Ok(Hop {
        channel: format_channel_id(hop.chan_id.parse(&format!("{}.chan_id", field))?),
        channel_capacity: hop
            .chan_capacity
            .parse(&format!("{}.chan_capacity", field))?,
        fee: fee.tokens(),
        fee_mtokens: fee.mtokens(),
        forward: forward.tokens(),
        forward_mtokens: forward.mtokens(),
        public_key: hop.pub_key.clone(),
        timeout: hop.expiry.parse(&format!("{}.expiry", field))?,
    })
}

fn normalize_modern(record: &ModernPaymentRecord) -> Result<Payment, GetPaymentError> {
    let path = &record.payment.path;
    let hops = path
        .hops
        .iter()
        .enumerate()
        .map(|(index, hop)| modern_hop(hop, &format!("payment.path.hops[{}]", index)))
        .collect::<Result<Vec<_>, _>>()?;

    let path = build_path(
        hops,
        MilliTokens::parse(&path.mtokens, "payment.path.mtokens")?,
        MilliTokens::parse(&record.payment.fee_mtokens, "payment.fee_mtokens")?,
        path.timeout.parse("payment.path.timeout")?,
    );

    let secret = record
        .secret
        .as_deref()
        .map(|raw| decode_secret(raw, "secret"))
        .transpose()?
        .flatten()
        .map(hex::encode);

    Ok(Payment::from_path(record.id.to_lowercase(), secret, path))
}

fn modern_hop(hop: &ModernHop, field: &str) -> Result<Hop, GetPaymentError> {
    let forward = MilliTokens::parse(
        &hop.forward_mtokens,
        &format!("{}.forward_mtokens", field),
    )?;
    let fee = MilliTokens::parse(&hop.fee_mtokens, &format!("{}.fee_mtokens", field))?;

    Ok(Hop {
        channel: hop.channel.clone(),
        channel_capacity: hop
            .channel_capacity
            .parse(&format!("{}.channel_capacity", field))?,
        fee: fee.tokens(),
        fee_mtokens: fee.mtokens(),
        forward: forward.tokens(),
        forward_mtokens: forward.mtokens(),
        public_key: hop.public_key.clone(),
        timeout: hop.timeout.parse(&format!("{}.timeout", field))?,
    })
}

/// Decodes a 32 byte secret given as hex or base64. `None` when empty or
/// all zero, which is how the node says the preimage is not known yet.
fn decode_secret(raw: &str, field: &str) -> Result<Option<Vec<u8>>, GetPaymentError> {
    if raw.is_empty() {
        return Ok(None);
    }

    let bytes = if raw.len() == PREIMAGE_LEN * 2 && raw.chars().all(|c| c.is_ascii_hexdigit()) {
        hex::decode(raw).map_err(|e| GetPaymentError::normalization(field, e))?
    } else {
        base64::engine::general_purpose::STANDARD
            .decode(raw)
            .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(raw))
            .map_err(|e| GetPaymentError::normalization(field, e))?
    };

    if bytes.len() != PREIMAGE_LEN {
        return Err(GetPaymentError::normalization(
            field,
            format!("expected {} bytes, got {}", PREIMAGE_LEN, bytes.len()),
        ));
    }

    if bytes.iter().all(|byte| *byte == 0) {
        return Ok(None);
    }

    Ok(Some(bytes))
}
