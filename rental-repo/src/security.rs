//! Staff API key hashing and outbox notification signing.

use chrono::{DateTime, Utc};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Hashes the staff API key using SHA-256; only the hash is kept in memory.
pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Checks a presented key against the configured hash in constant time.
pub fn verify_api_key(presented: &str, key_hash: &str) -> bool {
    hash_api_key(presented)
        .as_bytes()
        .ct_eq(key_hash.as_bytes())
        .into()
}

/// Builds the `X-Signature` value for a notification body.
///
/// Same layout as provider webhooks: `t=<unix seconds>,v1=<hex>` where the
/// MAC covers `"{t}.{body}"`, so receivers can reject replayed deliveries.
pub fn notification_signature(
    body: &[u8],
    secret: &str,
    signed_at: DateTime<Utc>,
) -> Result<String, InvalidLength> {
    let timestamp = signed_at.timestamp();
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_key_hash_is_stable_hex() {
        let hash = hash_api_key("sk_staff_lyon");

        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_api_key("sk_staff_lyon"));
        assert!(verify_api_key("sk_staff_lyon", &hash));
        assert!(!verify_api_key("sk_staff_paris", &hash));
    }

    #[test]
    fn test_notification_signature_binds_timestamp_and_body() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let body = br#"{"event":{"type":"deposit_captured"}}"#;

        let header = notification_signature(body, "nsec", at).unwrap();
        assert!(header.starts_with("t=1700000000,v1="));
        assert_eq!(header.len(), "t=1700000000,v1=".len() + 64);

        let later = at + chrono::Duration::seconds(1);
        assert_ne!(header, notification_signature(body, "nsec", later).unwrap());
        assert_ne!(header, notification_signature(b"{}", "nsec", at).unwrap());
        assert_ne!(header, notification_signature(body, "other", at).unwrap());
    }
}
