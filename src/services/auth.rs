//! Password hashing and signed session tokens.
//!
//! Passwords are stored as `hmac-sha256$<salt>$<digest>` where the digest is
//! HMAC-SHA256 of the password keyed with a random salt. Tokens are
//! `<claims>.<signature>`, both base64url, signed with the server secret.

use crate::configuration::AuthSettings;
use crate::error::{DirectoryError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

const HASH_SCHEME: &str = "hmac-sha256";
const SALT_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    ShopOwner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::ShopOwner => f.write_str("shop_owner"),
        }
    }
}

impl FromStr for Role {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "shop" | "shop_owner" | "owner" => Ok(Role::ShopOwner),
            other => Err(DirectoryError::Validation(format!("unknown role '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Admin username or shop id.
    pub sub: String,
    pub role: Role,
    /// Expiry, unix seconds.
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub claims: Claims,
}

pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = keyed_digest(&salt, password.as_bytes());
    format!(
        "{}${}${}",
        HASH_SCHEME,
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(digest)
    )
}

pub fn is_hashed(stored: &str) -> bool {
    stored.starts_with(HASH_SCHEME) && stored.split('$').count() == 3
}

/// Constant-time check of `password` against a stored hash. Records that
/// predate hashing hold the plain password and are compared directly.
pub fn verify_password(password: &str, stored: &str) -> bool {
    if !is_hashed(stored) {
        warn!("Comparing against an unhashed stored password");
        return !stored.is_empty() && stored == password;
    }
    let mut parts = stored.split('$').skip(1);
    let (Some(salt), Some(digest)) = (parts.next(), parts.next()) else {
        return false;
    };
    let (Ok(salt), Ok(digest)) = (URL_SAFE_NO_PAD.decode(salt), URL_SAFE_NO_PAD.decode(digest)) else {
        return false;
    };
    match HmacSha256::new_from_slice(&salt) {
        Ok(mut mac) => {
            mac.update(password.as_bytes());
            mac.verify_slice(&digest).is_ok()
        }
        Err(_) => false,
    }
}

fn keyed_digest(key: &[u8], message: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = HmacSha256::new_from_slice(key).unwrap_or_else(|_| unreachable!());
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Checks admin credentials and issues/verifies session tokens.
pub struct Authenticator {
    secret: Vec<u8>,
    token_ttl_secs: i64,
    admin_username: String,
    admin_password_hash: String,
}

impl Authenticator {
    pub fn new(settings: &AuthSettings) -> Self {
        let secret = if settings.token_secret.is_empty() {
            warn!("No auth.token_secret configured; sessions will not survive a restart");
            let mut secret = vec![0u8; 32];
            rand::thread_rng().fill_bytes(&mut secret);
            secret
        } else {
            settings.token_secret.as_bytes().to_vec()
        };
        if settings.admin_password_hash.is_empty() {
            warn!("No auth.admin_password_hash configured; admin login is disabled");
        }
        Self {
            secret,
            token_ttl_secs: settings.token_ttl_secs,
            admin_username: settings.admin_username.clone(),
            admin_password_hash: settings.admin_password_hash.clone(),
        }
    }

    pub fn check_admin(&self, username: &str, password: &str) -> bool {
        !self.admin_password_hash.is_empty()
            && username == self.admin_username
            && is_hashed(&self.admin_password_hash)
            && verify_password(password, &self.admin_password_hash)
    }

    pub fn issue(&self, sub: &str, role: Role) -> Result<Session> {
        let claims = Claims {
            sub: sub.to_string(),
            role,
            exp: Utc::now().timestamp() + self.token_ttl_secs,
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signature = URL_SAFE_NO_PAD.encode(keyed_digest(&self.secret, payload.as_bytes()));
        Ok(Session {
            token: format!("{}.{}", payload, signature),
            claims,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        let invalid = || DirectoryError::Authentication("invalid session token".into());

        let (payload, signature) = token.trim().split_once('.').ok_or_else(invalid)?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| invalid())?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        let bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
        let claims: Claims = serde_json::from_slice(&bytes).map_err(|_| invalid())?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(DirectoryError::Authentication("session expired".into()));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(secret: &str, password: &str) -> AuthSettings {
        AuthSettings {
            admin_username: "admin".into(),
            admin_password_hash: hash_password(password),
            token_secret: secret.into(),
            token_ttl_secs: 3600,
        }
    }

    #[test]
    fn hashes_are_salted_and_verifiable() {
        let a = hash_password("s3cret");
        let b = hash_password("s3cret");
        assert_ne!(a, b);
        assert!(verify_password("s3cret", &a));
        assert!(!verify_password("S3cret", &a));
        assert!(!verify_password("s3cret", "hmac-sha256$!!$!!"));
    }

    #[test]
    fn admin_check_needs_both_parts() {
        let auth = Authenticator::new(&settings("k", "pw"));
        assert!(auth.check_admin("admin", "pw"));
        assert!(!auth.check_admin("root", "pw"));
        assert!(!auth.check_admin("admin", "wrong"));
    }

    #[test]
    fn unconfigured_admin_cannot_log_in() {
        let mut s = settings("k", "pw");
        s.admin_password_hash.clear();
        assert!(!Authenticator::new(&s).check_admin("admin", ""));
    }

    #[test]
    fn tokens_verify_only_under_their_secret() {
        let auth = Authenticator::new(&settings("one", "pw"));
        let other = Authenticator::new(&settings("two", "pw"));
        let session = auth.issue("shop-1", Role::ShopOwner).unwrap();

        assert_eq!(auth.verify(&session.token).unwrap(), session.claims);
        assert!(matches!(
            other.verify(&session.token),
            Err(DirectoryError::Authentication(_))
        ));
        assert!(auth.verify("garbage").is_err());
    }

    #[test]
    fn tampered_claims_are_rejected() {
        let auth = Authenticator::new(&settings("one", "pw"));
        let session = auth.issue("shop-1", Role::ShopOwner).unwrap();
        let (_, signature) = session.token.split_once('.').unwrap();
        let forged_claims = Claims {
            sub: "shop-1".into(),
            role: Role::Admin,
            exp: session.claims.exp,
        };
        let forged = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap()),
            signature
        );
        assert!(auth.verify(&forged).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let mut s = settings("one", "pw");
        s.token_ttl_secs = -1;
        let auth = Authenticator::new(&s);
        let session = auth.issue("admin", Role::Admin).unwrap();
        assert!(matches!(
            auth.verify(&session.token),
            Err(DirectoryError::Authentication(msg)) if msg.contains("expired")
        ));
    }

    #[test]
    fn roles_parse_from_common_spellings() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("shop".parse::<Role>().unwrap(), Role::ShopOwner);
        assert!("guest".parse::<Role>().is_err());
    }
}
