//! Signed deep links into the wallet's device-authorization web flow.
//!
//! When the gateway shares a secret with the wallet and knows the buyer's
//! email, it appends a token that lets the wallet skip code and email entry
//! and land the user straight on the approval page.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Token format: `base64url(email) "." base64url(HMAC-SHA256(secret, "email:user_code"))`.
pub fn device_auth_token(secret: &str, email: &str, user_code: &str) -> Option<String> {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return None;
    };
    mac.update(format!("{email}:{user_code}").as_bytes());
    let signature = mac.finalize().into_bytes();
    Some(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(email.as_bytes()),
        URL_SAFE_NO_PAD.encode(signature)
    ))
}

/// Append the signed token to an authorization URL when possible; otherwise
/// hand the URL back unchanged.
pub fn signed_authorization_url(
    base_url: &str,
    secret: Option<&str>,
    email: Option<&str>,
    user_code: &str,
) -> String {
    if let (Some(secret), Some(email)) = (secret, email) {
        if let Some(token) = device_auth_token(secret, email, user_code) {
            return format!("{base_url}&t={token}");
        }
    }
    base_url.to_string()
}
