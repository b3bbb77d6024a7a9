//! Webhook signature verification (HMAC-SHA256, hex encoded)

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::error::PlatformError;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `body` under `secret`
pub fn sign(secret: &str, body: &[u8]) -> Result<String, PlatformError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| PlatformError::SignatureInvalid)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify the hex signature carried in `header` (constant-time compare)
pub fn verify_hex_header(
    secret: &str,
    headers: &HeaderMap,
    header: &str,
    body: &[u8],
) -> Result<(), PlatformError> {
    let Some(value) = headers.get(header).and_then(|v| v.to_str().ok()) else {
        tracing::warn!(target: "security", header, "Webhook signature header missing");
        return Err(PlatformError::SignatureInvalid);
    };
    let sig_bytes = hex::decode(value.trim().to_ascii_lowercase()).map_err(|_| {
        tracing::warn!(target: "security", header, "Webhook signature is not hex");
        PlatformError::SignatureInvalid
    })?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| PlatformError::SignatureInvalid)?;
    mac.update(body);
    mac.verify_slice(&sig_bytes).map_err(|_| {
        tracing::warn!(target: "security", header, "Webhook signature mismatch");
        PlatformError::SignatureInvalid
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_verify_accepts_matching_signature() {
        let body = br#"{"event_type":"orders.notification"}"#;
        let sig = sign("secret", body).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-uber-signature", HeaderValue::from_str(&sig.to_uppercase()).unwrap());
        assert!(verify_hex_header("secret", &headers, "x-uber-signature", body).is_ok());
    }

    #[test]
    fn test_verify_rejects_bad_or_missing_signature() {
        let body = b"{}";
        let mut headers = HeaderMap::new();
        assert!(verify_hex_header("secret", &headers, "x-uber-signature", body).is_err());

        let sig = sign("other-secret", body).unwrap();
        headers.insert("x-uber-signature", HeaderValue::from_str(&sig).unwrap());
        assert!(matches!(
            verify_hex_header("secret", &headers, "x-uber-signature", body),
            Err(PlatformError::SignatureInvalid)
        ));

        headers.insert("x-uber-signature", HeaderValue::from_static("not-hex"));
        assert!(verify_hex_header("secret", &headers, "x-uber-signature", body).is_err());
    }
}
