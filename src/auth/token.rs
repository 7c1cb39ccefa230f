//! Bearer tokens of the form `ats_<lookup>_<secret>`.
//!
//! The lookup part is stored in clear as the token's identifier so a request
//! can find its row; the whole token is only ever stored as an argon2id hash.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, distributions::Alphanumeric};

use crate::error::{Error, Result};
use crate::types::{AccessToken, NewAccessToken};

const PREFIX: &str = "ats_";
const LOOKUP_LEN: usize = 8;
const SECRET_LEN: usize = 32;

/// Issued tokens stop working a year after issue.
pub const TOKEN_LIFETIME_WEEKS: i64 = 52;

/// A token as presented in an `Authorization: Bearer` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BearerToken<'a> {
    pub lookup: &'a str,
    pub secret: &'a str,
}

impl<'a> BearerToken<'a> {
    pub fn parse(raw: &'a str) -> Result<Self> {
        let (lookup, secret) = raw
            .strip_prefix(PREFIX)
            .and_then(|rest| rest.split_once('_'))
            .ok_or(Error::InvalidTokenFormat)?;

        let well_formed = |part: &str, len: usize| {
            part.len() == len && part.bytes().all(|b| b.is_ascii_alphanumeric())
        };
        if !well_formed(lookup, LOOKUP_LEN) || !well_formed(secret, SECRET_LEN) {
            return Err(Error::InvalidTokenFormat);
        }

        Ok(Self { lookup, secret })
    }
}

/// A new token: `raw` goes to the operator once, `record` goes to the store.
pub struct IssuedToken {
    pub raw: String,
    pub record: NewAccessToken,
}

#[derive(Default)]
pub struct TokenHasher {
    argon2: Argon2<'static>,
}

impl TokenHasher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a token valid for [`TOKEN_LIFETIME_WEEKS`] from `issued_at`.
    pub fn issue(&self, issued_at: DateTime<Utc>) -> Result<IssuedToken> {
        let lookup = uuid::Uuid::new_v4().simple().to_string()[..LOOKUP_LEN].to_string();
        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SECRET_LEN)
            .map(char::from)
            .collect();

        let raw = format!("{PREFIX}{lookup}_{secret}");
        let salt = SaltString::generate(&mut OsRng);
        let token_hash = self
            .argon2
            .hash_password(raw.as_bytes(), &salt)
            .map_err(|e| Error::TokenHash(e.to_string()))?
            .to_string();

        Ok(IssuedToken {
            raw,
            record: NewAccessToken {
                identifier: lookup,
                token_hash,
                expires_at: Some(issued_at + Duration::weeks(TOKEN_LIFETIME_WEEKS)),
            },
        })
    }

    /// Whether `raw` is the token `stored` was issued for.
    pub fn matches(&self, raw: &str, stored: &AccessToken) -> Result<bool> {
        let hash =
            PasswordHash::new(&stored.token_hash).map_err(|e| Error::TokenHash(e.to_string()))?;

        match self.argon2.verify_password(raw.as_bytes(), &hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::TokenHash(e.to_string())),
        }
    }
}
