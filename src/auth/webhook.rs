//! Signature checks for inbound webhooks.
//!
//! Billing events carry `Stripe-Signature: t=<unix>,v1=<hex hmac>` over
//! `"<t>.<body>"`. Identity events carry svix headers with `v1,<base64 hmac>`
//! over `"<id>.<timestamp>.<body>"`, keyed by the decoded `whsec_` secret.

use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted clock skew, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Missing signature header")]
    MissingHeader,

    #[error("Malformed signature header")]
    Malformed,

    #[error("Invalid webhook secret")]
    InvalidSecret,

    #[error("Signature timestamp outside tolerance")]
    Expired,

    #[error("No matching signature")]
    Mismatch,
}

fn mac(secret: &[u8], parts: &[&[u8]]) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidSecret)?;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            mac.update(b".");
        }
        mac.update(part);
    }
    Ok(mac)
}

fn check_timestamp(timestamp: i64, now: i64) -> Result<(), SignatureError> {
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

pub fn verify_stripe_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::MissingHeader)?;

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for item in header.split(',') {
        match item.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    check_timestamp(timestamp, now)?;

    let ts = timestamp.to_string();
    for signature in signatures {
        let Ok(expected) = hex::decode(signature) else {
            continue;
        };
        if mac(secret.as_bytes(), &[ts.as_bytes(), payload])?
            .verify_slice(&expected)
            .is_ok()
        {
            return Ok(());
        }
    }
    Err(SignatureError::Mismatch)
}

/// Builds a `Stripe-Signature` header value for `payload`.
pub fn stripe_signature_header(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, SignatureError> {
    let ts = timestamp.to_string();
    let digest = mac(secret.as_bytes(), &[ts.as_bytes(), payload])?
        .finalize()
        .into_bytes();
    Ok(format!("t={},v1={}", timestamp, hex::encode(digest)))
}

/// svix signature headers of one delivery.
#[derive(Debug, Clone, Copy)]
pub struct SvixHeaders<'a> {
    pub id: Option<&'a str>,
    pub timestamp: Option<&'a str>,
    pub signature: Option<&'a str>,
}

fn svix_key(secret: &str) -> Result<Vec<u8>, SignatureError> {
    let encoded = secret.strip_prefix("whsec_").unwrap_or(secret);
    general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| SignatureError::InvalidSecret)
}

pub fn verify_svix_signature(
    payload: &[u8],
    headers: SvixHeaders<'_>,
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let (Some(id), Some(timestamp), Some(signature)) =
        (headers.id, headers.timestamp, headers.signature)
    else {
        return Err(SignatureError::MissingHeader);
    };

    let parsed: i64 = timestamp.parse().map_err(|_| SignatureError::Malformed)?;
    check_timestamp(parsed, now)?;

    let key = svix_key(secret)?;
    for candidate in signature.split_whitespace() {
        let Some(("v1", encoded)) = candidate.split_once(',') else {
            continue;
        };
        let Ok(expected) = general_purpose::STANDARD.decode(encoded) else {
            continue;
        };
        if mac(&key, &[id.as_bytes(), timestamp.as_bytes(), payload])?
            .verify_slice(&expected)
            .is_ok()
        {
            return Ok(());
        }
    }
    Err(SignatureError::Mismatch)
}

/// Builds an svix `v1,<signature>` value for `payload`.
pub fn svix_signature(payload: &[u8], id: &str, timestamp: i64, secret: &str) -> Result<String, SignatureError> {
    let key = svix_key(secret)?;
    let ts = timestamp.to_string();
    let digest = mac(&key, &[id.as_bytes(), ts.as_bytes(), payload])?
        .finalize()
        .into_bytes();
    Ok(format!("v1,{}", general_purpose::STANDARD.encode(digest)))
}
