use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Hex-encoded HMAC-SHA256 of `body` under `secret`, `None` if the key is
/// rejected.
pub fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a Neos delivery signature.
/// Expects header value like "sha256=<hex>", computed over the raw body bytes.
pub fn verify(secret: &str, body: &[u8], signature_header: &str) -> bool {
    let Some(presented_hex) = signature_header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };

    let Ok(presented) = hex::decode(presented_hex) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    // verify_slice compares in constant time.
    mac.verify_slice(&presented).is_ok()
}

/// Whether a header value has the shape `sha256=<something>`.
pub fn has_signature_prefix(signature_header: &str) -> bool {
    signature_header.starts_with(SIGNATURE_PREFIX)
}
