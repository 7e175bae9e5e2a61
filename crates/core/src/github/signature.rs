//! Webhook signature verification.
//!
//! GitHub signs every delivery with an HMAC of the raw request body keyed by
//! the hook's shared secret and sends it as `X-Hub-Signature-256:
//! sha256=<hex>` (and the older `X-Hub-Signature: sha1=<hex>`). The
//! algorithm is taken from the prefix of the header value; unknown prefixes
//! are rejected.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use tracing::warn;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Header carrying the `sha256=` signature.
pub const SIGNATURE_256_HEADER: &str = "x-hub-signature-256";
/// Legacy header carrying the `sha1=` signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

/// HMAC algorithm declared by a signature prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    Sha1,
    Sha256,
}

impl SignatureScheme {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1=",
            Self::Sha256 => "sha256=",
        }
    }

    /// Split `sha256=<hex>` into its scheme and hex digest.
    fn split(header: &str) -> Option<(Self, &str)> {
        let header = header.trim();
        if let Some(hex) = header.strip_prefix("sha256=") {
            Some((Self::Sha256, hex))
        } else {
            header.strip_prefix("sha1=").map(|hex| (Self::Sha1, hex))
        }
    }
}

/// Verify `signature` (the full header value, prefix included) over the raw
/// `body` using `secret`.
///
/// Never panics or errors: a missing header, unknown prefix, non-hex digest
/// or empty secret all verify as `false`. The digest comparison is
/// constant-time.
pub fn verify_signature(body: &[u8], signature: Option<&str>, secret: &str) -> bool {
    let Some(signature) = signature else {
        warn!("webhook delivery has no signature header");
        return false;
    };
    if secret.is_empty() {
        warn!("repository has no webhook secret, rejecting delivery");
        return false;
    }
    let Some((scheme, hex_sig)) = SignatureScheme::split(signature) else {
        warn!("webhook signature has an unknown algorithm prefix");
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        warn!("webhook signature is not valid hex");
        return false;
    };

    match scheme {
        SignatureScheme::Sha256 => match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(mut mac) => {
                mac.update(body);
                mac.verify_slice(&expected).is_ok()
            }
            Err(_) => false,
        },
        SignatureScheme::Sha1 => match HmacSha1::new_from_slice(secret.as_bytes()) {
            Ok(mut mac) => {
                mac.update(body);
                mac.verify_slice(&expected).is_ok()
            }
            Err(_) => false,
        },
    }
}

/// Compute the header value GitHub would send for `body`.
pub fn sign(scheme: SignatureScheme, body: &[u8], secret: &str) -> String {
    let digest = match scheme {
        SignatureScheme::Sha256 => hex_mac::<HmacSha256>(secret.as_bytes(), body),
        SignatureScheme::Sha1 => hex_mac::<HmacSha1>(secret.as_bytes(), body),
    };
    format!("{}{}", scheme.prefix(), digest)
}

fn hex_mac<M: Mac + hmac::digest::KeyInit>(key: &[u8], body: &[u8]) -> String {
    // HMAC takes keys of any length, so the error arm is unreachable.
    match <M as Mac>::new_from_slice(key) {
        Ok(mut mac) => {
            mac.update(body);
            hex::encode(mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    }
}
