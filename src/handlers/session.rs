use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Mutex;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "calorieai_session";
pub const SESSION_TTL_DAYS: i64 = 30;

/// Access-code gate in front of the analyze endpoint.
///
/// Tokens are `nonce.expiry.signature`, signed with the server secret, so
/// verifying one needs no lookup. Revoked tokens are remembered until they
/// would have expired anyway.
pub struct SessionGate {
    access_code: String,
    secret: Vec<u8>,
    revoked: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl SessionGate {
    pub fn new(access_code: String, secret: Vec<u8>) -> Self {
        Self {
            access_code: access_code.trim().to_lowercase(),
            secret,
            revoked: Mutex::new(HashMap::new()),
        }
    }

    /// Random secret for deployments that do not configure one
    pub fn random_secret() -> Vec<u8> {
        rand::thread_rng().gen::<[u8; 32]>().to_vec()
    }

    /// Exchange an access code for a session token. Case-insensitive.
    pub fn issue(&self, code: &str) -> Option<String> {
        self.issue_at(code, Utc::now())
    }

    pub fn verify(&self, token: &str) -> bool {
        self.verify_at(token, Utc::now())
    }

    pub fn revoke(&self, token: &str) {
        let now = Utc::now();
        let Some(expires_at) = self.signed_expiry(token) else {
            return;
        };

        let mut revoked = self.revoked.lock().unwrap_or_else(|e| e.into_inner());
        revoked.retain(|_, expiry| *expiry > now);
        if expires_at > now {
            revoked.insert(token.to_string(), expires_at);
            log::info!("🔒 Session revoked ({} tracked)", revoked.len());
        }
    }

    fn issue_at(&self, code: &str, now: DateTime<Utc>) -> Option<String> {
        if code.trim().to_lowercase() != self.access_code {
            log::warn!("🚫 Rejected access code attempt");
            return None;
        }

        let nonce = hex::encode(rand::thread_rng().gen::<[u8; 16]>());
        let expires = (now + Duration::days(SESSION_TTL_DAYS)).timestamp();
        let payload = format!("{}.{}", nonce, expires);
        let signature = hex::encode(self.mac(&payload).finalize().into_bytes());

        Some(format!("{}.{}", payload, signature))
    }

    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> bool {
        let expires_at = match self.signed_expiry(token) {
            Some(expires_at) => expires_at,
            None => return false,
        };
        if expires_at <= now {
            return false;
        }

        let revoked = self.revoked.lock().unwrap_or_else(|e| e.into_inner());
        !revoked.contains_key(token)
    }

    /// Expiry of a token whose signature checks out
    fn signed_expiry(&self, token: &str) -> Option<DateTime<Utc>> {
        let (payload, signature) = token.rsplit_once('.')?;
        let (_nonce, expires) = payload.split_once('.')?;

        let signature = hex::decode(signature).ok()?;
        self.mac(payload).verify_slice(&signature).ok()?;

        DateTime::<Utc>::from_timestamp(expires.parse().ok()?, 0)
    }

    fn mac(&self, payload: &str) -> HmacSha256 {
        // HMAC accepts keys of any length
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC key length is unrestricted"));
        mac.update(payload.as_bytes());
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> SessionGate {
        SessionGate::new("ImFat".to_string(), b"test-secret".to_vec())
    }

    #[test]
    fn test_issue_requires_matching_code() {
        let gate = gate();
        assert!(gate.issue("wrong").is_none());
        assert!(gate.issue("").is_none());
        assert!(gate.issue("  imfat ").is_some());
        assert!(gate.issue("IMFAT").is_some());
    }

    #[test]
    fn test_issued_token_verifies() {
        let gate = gate();
        let token = gate.issue("imfat").unwrap();
        assert!(gate.verify(&token));
        assert_ne!(token, gate.issue("imfat").unwrap());
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let gate = gate();
        let token = gate.issue("imfat").unwrap();

        let (payload, signature) = token.rsplit_once('.').unwrap();
        let (nonce, expires) = payload.split_once('.').unwrap();
        let extended = format!("{}.{}.{}", nonce, expires.parse::<i64>().unwrap() + 1000, signature);

        assert!(!gate.verify(&extended));
        assert!(!gate.verify("garbage"));
        assert!(!gate.verify(""));
        assert!(!gate.verify("a.b.c"));
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let other = SessionGate::new("imfat".to_string(), b"another-secret".to_vec());
        let token = other.issue("imfat").unwrap();
        assert!(!gate().verify(&token));
    }

    #[test]
    fn test_token_expires() {
        let gate = gate();
        let issued_at = Utc::now() - Duration::days(SESSION_TTL_DAYS + 1);
        let token = gate.issue_at("imfat", issued_at).unwrap();

        assert!(gate.verify_at(&token, issued_at + Duration::days(1)));
        assert!(!gate.verify(&token));
    }

    #[test]
    fn test_revoke() {
        let gate = gate();
        let token = gate.issue("imfat").unwrap();
        let other = gate.issue("imfat").unwrap();

        gate.revoke(&token);
        assert!(!gate.verify(&token));
        assert!(gate.verify(&other));

        // unsigned tokens are ignored
        gate.revoke("nonsense");
        assert_eq!(gate.revoked.lock().unwrap().len(), 1);
    }
}
