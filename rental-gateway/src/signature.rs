//! Webhook signature verification.
//!
//! Header format: `t=<unix seconds>,v1=<hex hmac>[,v1=...]`. The MAC is
//! HMAC-SHA256 over `"{t}.{payload}"` keyed with the endpoint secret.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rental_types::GatewayError;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Default replay window in seconds.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

struct SignatureHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Result<SignatureHeader<'_>, GatewayError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    GatewayError::SignatureInvalid("Invalid timestamp".into())
                })?);
            }
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    match timestamp {
        Some(timestamp) if !signatures.is_empty() => Ok(SignatureHeader {
            timestamp,
            signatures,
        }),
        _ => Err(GatewayError::SignatureInvalid(
            "Invalid signature header format".into(),
        )),
    }
}

fn compute(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| GatewayError::SignatureInvalid("Invalid secret key".into()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies `header` against `payload`.
///
/// Fails closed: any parse problem, stale timestamp or mismatch is an error.
pub fn verify(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: DateTime<Utc>,
) -> Result<(), GatewayError> {
    if secret.is_empty() {
        return Err(GatewayError::SignatureInvalid(
            "Webhook secret not configured".into(),
        ));
    }

    let parsed = parse_header(header)?;
    if now.timestamp().abs_diff(parsed.timestamp) > tolerance_secs.unsigned_abs() {
        return Err(GatewayError::SignatureInvalid(
            "Timestamp outside tolerance window".into(),
        ));
    }

    let expected = compute(payload, secret, parsed.timestamp)?;
    let matched = parsed
        .signatures
        .iter()
        .any(|candidate| bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())));

    if matched {
        Ok(())
    } else {
        Err(GatewayError::SignatureInvalid("Signature mismatch".into()))
    }
}

/// Produces a header value for `payload`, as the provider would.
///
/// Used by tests and local tooling that replays events.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, GatewayError> {
    Ok(format!("t={timestamp},v1={}", compute(payload, secret, timestamp)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    #[test]
    fn test_valid_signature_verifies() {
        let now = Utc::now();
        let header = sign(b"{}", SECRET, now.timestamp()).unwrap();
        assert!(verify(b"{}", &header, SECRET, DEFAULT_TOLERANCE_SECS, now).is_ok());
    }

    #[test]
    fn test_tampered_payload_fails() {
        let now = Utc::now();
        let header = sign(b"{\"amount\":100}", SECRET, now.timestamp()).unwrap();
        let result = verify(
            b"{\"amount\":999}",
            &header,
            SECRET,
            DEFAULT_TOLERANCE_SECS,
            now,
        );
        assert!(matches!(result, Err(GatewayError::SignatureInvalid(_))));
    }

    #[test]
    fn test_stale_timestamp_fails() {
        let now = Utc::now();
        let header = sign(b"{}", SECRET, now.timestamp() - 3600).unwrap();
        assert!(verify(b"{}", &header, SECRET, DEFAULT_TOLERANCE_SECS, now).is_err());
    }

    #[test]
    fn test_any_matching_v1_is_accepted() {
        let now = Utc::now();
        let good = sign(b"{}", SECRET, now.timestamp()).unwrap();
        let v1 = good.split_once(",v1=").unwrap().1;
        let header = format!("t={},v1=deadbeef,v1={v1}", now.timestamp());
        assert!(verify(b"{}", &header, SECRET, DEFAULT_TOLERANCE_SECS, now).is_ok());
    }

    #[test]
    fn test_extreme_timestamps_are_rejected() {
        let now = Utc::now();
        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={t},v1=00");
            let result = verify(b"{}", &header, SECRET, DEFAULT_TOLERANCE_SECS, now);
            assert!(matches!(result, Err(GatewayError::SignatureInvalid(_))));
        }
    }

    #[test]
    fn test_malformed_header_and_missing_secret_fail() {
        let now = Utc::now();
        assert!(verify(b"{}", "garbage", SECRET, DEFAULT_TOLERANCE_SECS, now).is_err());
        let header = sign(b"{}", SECRET, now.timestamp()).unwrap();
        assert!(verify(b"{}", &header, "", DEFAULT_TOLERANCE_SECS, now).is_err());
    }
}
