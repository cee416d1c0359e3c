use anyhow::anyhow;
use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use log::{debug, info, warn};
use payment_status_core::{validate_payment_hash, PaymentState};
use reqwest::{Certificate, Client, Response, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    fs::{self, metadata},
    path::Path,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::LnSettings;

const SIGNAL_BUFFER: usize = 16;

/// A tracking update delivered by the node
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: PaymentState,
    pub failure_reason: Option<String>,
    /// The full update as received, normalized later if the payment succeeded
    pub record: Value,
}

impl StatusUpdate {
    pub fn from_value(record: Value) -> Self {
        let status = record
            .get("status")
            .and_then(Value::as_str)
            .map(PaymentState::from)
            .unwrap_or_else(|| PaymentState::Other(String::new()));
        let failure_reason = record
            .get("failure_reason")
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            status,
            failure_reason,
            record,
        }
    }
}

/// Signals a tracking subscription emits
#[derive(Debug, Clone, PartialEq)]
pub enum StatusSignal {
    Data(StatusUpdate),
    Error(Value),
    End,
}

/// A live payment tracking subscription.
///
/// Signals arrive on a channel fed by whoever opened the subscription. A
/// closed channel reads as [`StatusSignal::End`]. Dropping the subscription
/// cancels its token so the feeding task can stop.
pub struct Subscription {
    signals: mpsc::Receiver<StatusSignal>,
    cancel_token: CancellationToken,
}

impl Subscription {
    pub fn new(signals: mpsc::Receiver<StatusSignal>, cancel_token: CancellationToken) -> Self {
        Self {
            signals,
            cancel_token,
        }
    }

    /// Creates a subscription along with the sender that feeds it
    pub fn channel(buffer: usize) -> (mpsc::Sender<StatusSignal>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx, CancellationToken::new()))
    }

    /// Token cancelled when this subscription is released
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub async fn next_signal(&mut self) -> StatusSignal {
        self.signals.recv().await.unwrap_or(StatusSignal::End)
    }

    /// Stop listening; the feeding side observes the cancelled token
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.signals.close();
        self.cancel_token.cancel();
    }
}

/// Session handle able to track a previously sent payment
#[async_trait]
pub trait PaymentTracker: Send + Sync {
    async fn track_payment(&self, payment_hash: &str) -> Result<Subscription, anyhow::Error>;
}

#[derive(Clone)]
pub struct LnClient {
    pub base_url: Url,
    pub client: ClientWithMiddleware,
    pub macaroon: SecretString,
}

impl LnClient {
    pub async fn new(settings: LnSettings) -> Result<Self, anyhow::Error> {
        let macaroon = get_macaroon(&settings.macaroon_file_path)?;
        let client = if let Some(tls_cert_path) = settings.tls_cert_path {
            info!("Found tls.cert file, using for lnd client");
            let cert = get_tls_cert(&tls_cert_path)?;

            build_reqwest_tls_client(cert)?
        } else {
            info!("No tls.cert file found, skipping for lnd client");
            build_reqwest_client()?
        };
        Ok(Self {
            base_url: Url::parse(&settings.base_url)?,
            client,
            macaroon,
        })
    }
}

fn retrying(client: Client) -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
    ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

pub fn build_reqwest_client() -> Result<ClientWithMiddleware, anyhow::Error> {
    Ok(retrying(Client::builder().build()?))
}

pub fn build_reqwest_tls_client(
    tls_cert: Certificate,
) -> Result<ClientWithMiddleware, anyhow::Error> {
    let client = Client::builder()
        .add_root_certificate(tls_cert)
        .danger_accept_invalid_certs(true) // only use this for development locally or for self signed certs
        .tls_built_in_root_certs(true)
        .build()?;
    Ok(retrying(client))
}

pub fn get_tls_cert(file_path: &str) -> Result<Certificate, anyhow::Error> {
    if !has_extension(file_path, "cert") {
        return Err(anyhow!("Not a '.cert' file extension"));
    }

    metadata(file_path)?;
    let cert_bytes =
        fs::read(file_path).map_err(|e| anyhow!("Failed to read tls cert file: {}", e))?;
    Certificate::from_pem(&cert_bytes).map_err(|e| anyhow!("Failed to build cert from file: {}", e))
}

pub fn get_macaroon(file_path: &str) -> Result<SecretString, anyhow::Error> {
    if !has_extension(file_path, "macaroon") {
        return Err(anyhow!("Not a '.macaroon' file extension"));
    }

    metadata(file_path)?;
    let contents =
        fs::read(file_path).map_err(|e| anyhow!("Failed to read macaroon file: {}", e))?;
    Ok(SecretString::from(hex::encode(contents)))
}

fn has_extension(file_path: &str, extension: &str) -> bool {
    Path::new(file_path).extension().and_then(|s| s.to_str()) == Some(extension)
}

const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";

/// One line of LND's `/v2/router/track` stream
#[derive(Debug, Serialize, Deserialize)]
pub struct TrackPaymentMessage {
    pub result: Option<Value>,
    pub error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct LndPayment {
    status: Option<String>,
    payment_preimage: Option<String>,
    failure_reason: Option<String>,
    #[serde(default)]
    htlcs: Vec<LndHtlcAttempt>,
}

#[derive(Debug, Deserialize)]
struct LndHtlcAttempt {
    status: Option<String>,
    route: Option<Value>,
}

/// Reshape LND's payment object into the single-route record: the route of
/// the HTLC attempt that succeeded plus the payment preimage
pub fn lnd_payment_as_record(payment: Value) -> Value {
    let lnd_payment: LndPayment = match serde_json::from_value(payment.clone()) {
        Ok(lnd_payment) => lnd_payment,
        Err(e) => {
            debug!("Passing through unrecognized payment update: {}", e);
            return payment;
        }
    };

    let route = lnd_payment
        .htlcs
        .into_iter()
        .find(|htlc| htlc.status.as_deref() == Some("SUCCEEDED"))
        .and_then(|htlc| htlc.route);

    let mut record = json!({
        "status": lnd_payment.status,
        "failure_reason": lnd_payment.failure_reason,
        "htlcs": [],
        "preimage": lnd_payment.payment_preimage,
        "state": lnd_payment.status,
    });
    if let Some(route) = route {
        record["route"] = route;
    }
    record
}

pub fn parse_track_line(line: &str) -> Option<StatusSignal> {
    let message: TrackPaymentMessage = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            warn!("Skipping unreadable payment tracking line: {}", e);
            return None;
        }
    };

    if let Some(error) = message.error {
        return Some(StatusSignal::Error(error));
    }

    let result = message.result?;
    Some(StatusSignal::Data(StatusUpdate::from_value(
        lnd_payment_as_record(result),
    )))
}

#[async_trait]
impl PaymentTracker for LnClient {
    async fn track_payment(&self, payment_hash: &str) -> Result<Subscription, anyhow::Error> {
        let payment_hash = validate_payment_hash(Some(payment_hash))?;
        let hash_bytes =
            hex::decode(payment_hash).map_err(|e| anyhow!("Failed to decode hex hash: {}", e))?;
        let hash_base64 = base64::engine::general_purpose::URL_SAFE.encode(&hash_bytes);

        let url = format!("{}v2/router/track/{}", self.base_url, hash_base64);
        debug!("Tracking payment at: {}", url);

        let response = self
            .client
            .get(url)
            .header(MACAROON_HEADER, self.macaroon.expose_secret())
            .send()
            .await?;

        let (tx, subscription) = Subscription::channel(SIGNAL_BUFFER);
        let cancel_token = subscription.cancel_token();
        let payment_hash = payment_hash.to_string();

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            warn!("Tracking payment {} failed with {}: {}", payment_hash, status, body);
            let cause = serde_json::from_str::<TrackPaymentMessage>(&body)
                .ok()
                .and_then(|message| message.error)
                .or_else(|| serde_json::from_str::<Value>(&body).ok())
                .unwrap_or(Value::String(body));
            let _ = tx.send(StatusSignal::Error(cause)).await;
            return Ok(subscription);
        }

        tokio::spawn(async move {
            tokio::select! {
                _ = forward_track_stream(response, &tx) => {
                    debug!("Payment tracking stream for {} finished", payment_hash);
                }
                _ = cancel_token.cancelled() => {
                    debug!("Payment tracking for {} released", payment_hash);
                }
            }
        });

        Ok(subscription)
    }
}

/// Splits the byte stream into lines, decoding only complete lines so a
/// multi-byte character split across chunks survives intact
#[derive(Debug, Default)]
pub struct TrackLineBuffer {
    pending: Vec<u8>,
}

impl TrackLineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StatusSignal> {
        self.pending.extend_from_slice(chunk);

        let mut signals = Vec::new();
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            signals.extend(decode_track_line(&line));
        }
        signals
    }

    /// Parse whatever is left once the stream closes
    pub fn finish(self) -> Option<StatusSignal> {
        decode_track_line(&self.pending)
    }
}

fn decode_track_line(line: &[u8]) -> Option<StatusSignal> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    parse_track_line(line)
}

async fn forward_track_stream(response: Response, tx: &mpsc::Sender<StatusSignal>) {
    let mut stream = response.bytes_stream();
    let mut lines = TrackLineBuffer::default();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Payment tracking stream error: {}", e);
                let _ = tx.send(StatusSignal::Error(json!(e.to_string()))).await;
                return;
            }
        };

        for signal in lines.push(&chunk) {
            if tx.send(signal).await.is_err() {
                return;
            }
        }
    }

    if let Some(signal) = lines.finish() {
        let _ = tx.send(signal).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_in_flight_line() {
        let line = r#"{"result":{"payment_hash":"00","status":"IN_FLIGHT","htlcs":[]}}"#;
        let Some(StatusSignal::Data(update)) = parse_track_line(line) else {
            panic!("expected a data signal");
        };
        assert_eq!(update.status, PaymentState::InFlight);
    }

    #[test]
    fn test_parse_error_line() {
        let line = r#"{"error":{"code":5,"message":"payment isn't initiated","details":[]}}"#;
        assert_eq!(
            parse_track_line(line),
            Some(StatusSignal::Error(json!({
                "code": 5,
                "message": "payment isn't initiated",
                "details": [],
            })))
        );
    }

    #[test]
    fn test_parse_garbage_line() {
        assert_eq!(parse_track_line("not json"), None);
        assert_eq!(parse_track_line("{}"), None);
    }

    #[test]
    fn test_succeeded_payment_uses_succeeded_route() {
        let payment = json!({
            "payment_hash": "ab".repeat(32),
            "payment_preimage": "cd".repeat(32),
            "status": "SUCCEEDED",
            "failure_reason": "FAILURE_REASON_NONE",
            "htlcs": [
                { "status": "FAILED", "route": { "total_amt_msat": "9" } },
                { "status": "SUCCEEDED", "route": { "total_amt_msat": "1000" } },
            ],
        });

        let record = lnd_payment_as_record(payment);
        assert_eq!(record["route"], json!({ "total_amt_msat": "1000" }));
        assert_eq!(record["preimage"], json!("cd".repeat(32)));
        assert_eq!(record["htlcs"], json!([]));
        assert_eq!(record["status"], json!("SUCCEEDED"));
    }

    #[test]
    fn test_failed_update_keeps_failure_reason() {
        let line = r#"{"result":{"status":"FAILED","failure_reason":"FAILURE_REASON_NO_ROUTE","htlcs":[]}}"#;
        let Some(StatusSignal::Data(update)) = parse_track_line(line) else {
            panic!("expected a data signal");
        };
        assert_eq!(update.status, PaymentState::Failed);
        assert_eq!(
            update.failure_reason.as_deref(),
            Some("FAILURE_REASON_NO_ROUTE")
        );
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let line = "{\"error\":{\"message\":\"pago rechazado \u{e9}\"}}\n".as_bytes();
        let split = line.iter().position(|byte| *byte >= 0x80).unwrap() + 1;

        let mut lines = TrackLineBuffer::default();
        assert!(lines.push(&line[..split]).is_empty());
        assert_eq!(
            lines.push(&line[split..]),
            vec![StatusSignal::Error(json!({ "message": "pago rechazado \u{e9}" }))]
        );
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn test_unterminated_last_line_is_parsed() {
        let mut lines = TrackLineBuffer::default();
        assert!(lines
            .push(br#"{"result":{"status":"IN_FLIGHT"}}"#)
            .is_empty());
        assert!(matches!(lines.finish(), Some(StatusSignal::Data(_))));
    }

    #[tokio::test]
    async fn test_closed_channel_reads_as_end() {
        let (tx, mut subscription) = Subscription::channel(1);
        drop(tx);
        assert_eq!(subscription.next_signal().await, StatusSignal::End);
    }

    #[tokio::test]
    async fn test_release_cancels_token() {
        let (_tx, subscription) = Subscription::channel(1);
        let token = subscription.cancel_token();
        assert!(!token.is_cancelled());
        subscription.release();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_macaroon_requires_extension() {
        assert!(get_macaroon("./creds/admin.txt").is_err());
        assert!(get_tls_cert("./creds/tls.pem").is_err());
    }
}
