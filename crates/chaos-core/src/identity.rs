//! Identity collaborators: bearer tokens and credential hashing.
//!
//! Both are traits so workflows never depend on a concrete primitive.
//! [`JwtIssuer`] signs HS256 tokens with `jsonwebtoken`; [`SaltedSha256`]
//! stores credentials as `hex(salt)$hex(sha256(salt || secret))`.

use chaos_types::{Role, User, UserId};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Minimum length of the token signing secret, in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

const SALT_LENGTH: usize = 16;

/// Errors raised by identity collaborators.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The signing secret is too short.
    #[error("JWT secret must be at least {MIN_SECRET_LENGTH} bytes, got {length}")]
    WeakSecret {
        /// Length of the rejected secret.
        length: usize,
    },

    /// Signing or verification failed.
    #[error("token error: {source}")]
    Token {
        /// The underlying `jsonwebtoken` error.
        #[from]
        source: jsonwebtoken::errors::Error,
    },

    /// The token verified but its subject is not a user ID.
    #[error("malformed token subject: {0}")]
    MalformedSubject(String),
}

/// What a verified token asserts about its bearer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claims {
    /// The user the token was issued to.
    pub user_id: UserId,
    /// The role at issue time. Callers re-read the current role.
    pub role: Role,
}

/// Issues and verifies opaque bearer tokens.
pub trait TokenIssuer: Send + Sync {
    /// Issue a token for `user`.
    fn issue_token(&self, user: &User) -> Result<String, IdentityError>;

    /// Verify `token` and return its claims.
    fn verify_token(&self, token: &str) -> Result<Claims, IdentityError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct JwtClaims {
    sub: String,
    role: Role,
    iat: i64,
    exp: i64,
    iss: String,
}

/// HS256 JSON Web Token issuer.
pub struct JwtIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl_secs: i64,
}

impl JwtIssuer {
    /// Create an issuer.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::WeakSecret`] if `secret` is shorter than
    /// [`MIN_SECRET_LENGTH`] bytes.
    pub fn new(secret: &str, issuer: &str, ttl_secs: u64) -> Result<Self, IdentityError> {
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(IdentityError::WeakSecret {
                length: secret.len(),
            });
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: issuer.to_owned(),
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        })
    }
}

impl TokenIssuer for JwtIssuer {
    fn issue_token(&self, user: &User) -> Result<String, IdentityError> {
        let now = Utc::now().timestamp();
        let claims = JwtClaims {
            sub: user.id.to_string(),
            role: user.role,
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
            iss: self.issuer.clone(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    fn verify_token(&self, token: &str) -> Result<Claims, IdentityError> {
        let data = decode::<JwtClaims>(token, &self.decoding, &self.validation)?;
        let user_id = data
            .claims
            .sub
            .parse::<UserId>()
            .map_err(|e| IdentityError::MalformedSubject(e.to_string()))?;
        Ok(Claims {
            user_id,
            role: data.claims.role,
        })
    }
}

/// Hashes and verifies login secrets.
pub trait CredentialHasher: Send + Sync {
    /// Hash `secret` with a fresh salt.
    fn hash(&self, secret: &str) -> String;

    /// Whether `secret` matches the `stored` hash.
    fn verify(&self, secret: &str, stored: &str) -> bool;
}

/// Salted SHA-256 credential hashing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SaltedSha256;

fn digest(salt: &[u8], secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

impl CredentialHasher for SaltedSha256 {
    fn hash(&self, secret: &str) -> String {
        let mut salt = [0u8; SALT_LENGTH];
        rand::rng().fill(&mut salt);
        format!("{}${}", hex::encode(salt), hex::encode(digest(&salt, secret)))
    }

    fn verify(&self, secret: &str, stored: &str) -> bool {
        let Some((salt_hex, hash_hex)) = stored.split_once('$') else {
            return false;
        };
        let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(hash_hex)) else {
            return false;
        };
        digest(&salt, secret).ct_eq(&expected).into()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "a-test-secret-that-is-long-enough-for-hs256";

    fn user(id: u64, role: Role) -> User {
        let now = Utc::now();
        User {
            id: UserId::new(id),
            username: String::from("daemon_alpha"),
            email: String::from("alpha@daemon.chaos"),
            role,
            status: chaos_types::UserStatus::Active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn short_secret_is_rejected() {
        let result = JwtIssuer::new("short", "chaos", 60);
        assert!(matches!(
            result,
            Err(IdentityError::WeakSecret { length: 5 })
        ));
    }

    #[test]
    fn token_round_trip_carries_user_and_role() {
        let issuer = JwtIssuer::new(SECRET, "chaos", 3600).unwrap();
        let token = issuer.issue_token(&user(2, Role::Agent)).unwrap();
        let claims = issuer.verify_token(&token).unwrap();
        assert_eq!(claims.user_id, UserId::new(2));
        assert_eq!(claims.role, Role::Agent);
    }

    #[test]
    fn token_from_another_issuer_is_rejected() {
        let ours = JwtIssuer::new(SECRET, "chaos", 3600).unwrap();
        let theirs = JwtIssuer::new(SECRET, "someone-else", 3600).unwrap();
        let token = theirs.issue_token(&user(2, Role::Agent)).unwrap();
        assert!(ours.verify_token(&token).is_err());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let issuer = JwtIssuer::new(SECRET, "chaos", 3600).unwrap();
        let mut token = issuer.issue_token(&user(2, Role::Agent)).unwrap();
        token.push('x');
        assert!(issuer.verify_token(&token).is_err());
    }

    #[test]
    fn hashes_are_salted_and_verify() {
        let hasher = SaltedSha256;
        let first = hasher.hash("DaemonAlpha123!");
        let second = hasher.hash("DaemonAlpha123!");
        assert_ne!(first, second);
        assert!(hasher.verify("DaemonAlpha123!", &first));
        assert!(hasher.verify("DaemonAlpha123!", &second));
        assert!(!hasher.verify("daemonalpha123!", &first));
    }

    #[test]
    fn tampered_or_truncated_digest_never_verifies() {
        let hasher = SaltedSha256;
        let stored = hasher.hash("DaemonAlpha123!");
        let (salt, digest) = stored.split_once('$').unwrap();

        let mut flipped = hex::decode(digest).unwrap();
        if let Some(last) = flipped.last_mut() {
            *last ^= 1;
        }
        let tampered = format!("{salt}${}", hex::encode(flipped));
        assert!(!hasher.verify("DaemonAlpha123!", &tampered));

        let truncated = format!("{salt}${}", digest.get(2..).unwrap());
        assert!(!hasher.verify("DaemonAlpha123!", &truncated));
        assert!(!hasher.verify("DaemonAlpha123!", &format!("{salt}$")));
    }

    #[test]
    fn malformed_stored_hash_never_verifies() {
        let hasher = SaltedSha256;
        assert!(!hasher.verify("x", "no-separator"));
        assert!(!hasher.verify("x", "zz$zz"));
        assert!(!hasher.verify("x", ""));
    }
}
