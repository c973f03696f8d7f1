//! Admin account passwords
//!
//! Passwords are stored in `users.password_hash` as Argon2id PHC strings
//! with the argon2 crate's default cost. Hashes written with another
//! algorithm or cost are still accepted at login and replaced with a
//! current hash right after (see `needs_rehash`).

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params,
};

/// Hash a password with Argon2id and a random salt, returning the PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("Failed to hash password: {}", e))
}

/// Check a password against a stored PHC hash.
///
/// A mismatch is `Ok(false)`; a hash that cannot be parsed is an error.
/// Any Argon2 variant is verified with the parameters recorded in the hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| anyhow!("Invalid password hash format: {}", e))
        .context("Failed to parse password hash")?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow!("Password verification failed: {}", e)),
    }
}

/// Whether a stored hash should be replaced by `hash_password` output:
/// it is unparsable, not Argon2id, or made with a different memory, time
/// or parallelism cost.
pub fn needs_rehash(hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return true;
    };
    if parsed.algorithm != Algorithm::Argon2id.ident() {
        return true;
    }

    let current = Params::default();
    match Params::try_from(&parsed) {
        Ok(params) => {
            params.m_cost() != current.m_cost()
                || params.t_cost() != current.t_cost()
                || params.p_cost() != current.p_cost()
        }
        Err(_) => true,
    }
}
