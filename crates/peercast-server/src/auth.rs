//! Room tokens.
//!
//! A room token is an HS256 JWT that admits one account into one room. It
//! carries the account's public profile, since the relay keeps no user store
//! of its own.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use peercast_core::Account;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Token errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Signature, encoding or claims are not acceptable.
    #[error("Invalid room token")]
    TokenInvalid,

    /// The token's `exp` is in the past.
    #[error("Room token expired")]
    TokenExpired,

    /// The token was issued for another room.
    #[error("Room token was issued for another room")]
    RoomMismatch,

    /// Signing failed.
    #[error("Failed to sign room token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

impl AuthError {
    /// Short label used in metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::TokenInvalid => "invalid",
            AuthError::TokenExpired => "expired",
            AuthError::RoomMismatch => "room_mismatch",
            AuthError::Signing(_) => "signing",
        }
    }
}

/// Claims carried by a room token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomClaims {
    pub user_id: i64,
    pub room_id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies room tokens with a shared secret.
#[derive(Clone)]
pub struct RoomTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl RoomTokens {
    /// Create a token service for `secret`.
    #[must_use]
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    /// Issue a token admitting `account` into `room_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue(&self, account: &Account, room_id: &str) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = RoomClaims {
            user_id: account.id,
            room_id: room_id.to_string(),
            name: account.name.clone(),
            avatar: account.avatar.clone(),
            iat: now,
            exp: now.saturating_add(ttl),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &RoomClaims) -> Result<String, AuthError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)?)
    }

    /// Verify `token` for `room_id` and return the account it admits.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, badly signed, expired or
    /// issued for a different room.
    pub fn verify(&self, token: &str, room_id: &str) -> Result<Account, AuthError> {
        let data = decode::<RoomClaims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!(error = %e, "Room token rejected");
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            }
        })?;

        let claims = data.claims;
        if claims.room_id != room_id {
            debug!(
                token_room = %claims.room_id,
                room = %room_id,
                account = claims.user_id,
                "Room token used for another room"
            );
            return Err(AuthError::RoomMismatch);
        }

        Ok(Account::new(claims.user_id, claims.name, claims.avatar))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOM: &str = "0e7e3cf6-4d34-4a44-9d0a-5d8b14c1e5a7";

    fn tokens() -> RoomTokens {
        RoomTokens::new(b"test-secret", Duration::from_secs(3600))
    }

    fn account() -> Account {
        Account::new(42, "Alice", "https://img/alice.png")
    }

    #[test]
    fn test_issue_and_verify() {
        let tokens = tokens();
        let token = tokens.issue(&account(), ROOM).unwrap();
        assert_eq!(tokens.verify(&token, ROOM).unwrap(), account());
    }

    #[test]
    fn test_room_mismatch() {
        let tokens = tokens();
        let token = tokens.issue(&account(), ROOM).unwrap();
        assert!(matches!(
            tokens.verify(&token, "5b0f6b8e-8d7c-4c39-a3a4-0f6f1f0a2b3c"),
            Err(AuthError::RoomMismatch)
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let token = tokens().issue(&account(), ROOM).unwrap();
        let other = RoomTokens::new(b"other-secret", Duration::from_secs(3600));
        assert!(matches!(
            other.verify(&token, ROOM),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn test_garbage_token() {
        let err = tokens().verify("not.a.jwt", ROOM).unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid));
        assert_eq!(err.reason(), "invalid");
    }

    #[test]
    fn test_expired_token() {
        let tokens = tokens();
        let now = Utc::now().timestamp();
        let token = tokens
            .sign(&RoomClaims {
                user_id: 42,
                room_id: ROOM.to_string(),
                name: "Alice".to_string(),
                avatar: String::new(),
                iat: now - 7200,
                exp: now - 3600,
            })
            .unwrap();

        let err = tokens.verify(&token, ROOM).unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
        assert_eq!(err.reason(), "expired");
    }

    #[test]
    fn test_claims_carry_profile() {
        let tokens = tokens();
        let token = tokens.issue(&account(), ROOM).unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let claims = decode::<RoomClaims>(&token, &DecodingKey::from_secret(b"test-secret"), &validation)
            .unwrap()
            .claims;
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.room_id, ROOM);
        assert_eq!(claims.name, "Alice");
        assert_eq!(claims.exp - claims.iat, 3600);
    }
}
