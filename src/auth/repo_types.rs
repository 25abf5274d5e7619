use std::fmt;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use sqlx::FromRow;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::error;
use uuid::Uuid;

use crate::clock;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("password field is write-only")]
    WriteOnly,
}

/// One-way password credential. Built only by hashing a plaintext, checked
/// only through [`HashedPassword::verify`].
#[derive(Clone, sqlx::Type)]
#[sqlx(transparent)]
pub struct HashedPassword(String);

impl HashedPassword {
    /// Salted Argon2id hash of `plain`, kept in PHC string form.
    pub fn from_plain(plain: &str) -> anyhow::Result<Self> {
        let salt = SaltString::generate(&mut OsRng);
        let phc = Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("hash password: {e}"))?
            .to_string();
        Ok(Self(phc))
    }

    /// A stored value that is not a PHC string never matches.
    pub fn verify(&self, plain: &str) -> bool {
        match PasswordHash::new(&self.0) {
            Ok(parsed) => Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                error!(error = %e, "stored password hash is malformed");
                false
            }
        }
    }
}

impl fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HashedPassword(<redacted>)")
    }
}

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    password_hash: HashedPassword,
    pub created_at: OffsetDateTime,
}

impl User {
    /// The plaintext is never kept, so reading it always fails.
    pub fn password(&self) -> Result<&str, CredentialError> {
        Err(CredentialError::WriteOnly)
    }

    pub fn check_password(&self, plain: &str) -> bool {
        self.password_hash.verify(plain)
    }

    #[cfg(test)]
    pub(crate) fn from_new(id: Uuid, new: NewUser) -> Self {
        Self {
            id,
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            created_at: new.created_at,
        }
    }
}

/// A user that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub(crate) password_hash: HashedPassword,
    pub created_at: OffsetDateTime,
}

impl NewUser {
    pub fn new(username: String, email: String, password: &str) -> anyhow::Result<Self> {
        Ok(Self {
            username,
            email,
            password_hash: HashedPassword::from_plain(password)?,
            created_at: clock::eastern_now(),
        })
    }
}
