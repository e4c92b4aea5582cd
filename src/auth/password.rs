// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Salted password hashing (PBKDF2-HMAC-SHA256).

use std::num::NonZeroU32;

use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

const ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;
const ITERATIONS: NonZeroU32 = NonZeroU32::new(100_000).unwrap();
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// The operating system's secure random source failed.
#[derive(Debug, thiserror::Error)]
#[error("secure random source unavailable")]
pub struct RandomnessUnavailable;

/// A salted password hash. The plaintext is never kept.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Password {
    salt: Vec<u8>,
    hash: Vec<u8>,
}

impl Password {
    /// Hash `plaintext` under a fresh random salt.
    pub fn set(plaintext: &str) -> Result<Self, RandomnessUnavailable> {
        let mut salt = vec![0u8; SALT_LEN];
        SystemRandom::new()
            .fill(&mut salt)
            .map_err(|_| RandomnessUnavailable)?;

        let mut hash = vec![0u8; HASH_LEN];
        pbkdf2::derive(ALGORITHM, ITERATIONS, &salt, plaintext.as_bytes(), &mut hash);
        Ok(Self { salt, hash })
    }

    /// Constant-time comparison of `plaintext` against the stored hash.
    pub fn matches(&self, plaintext: &str) -> bool {
        pbkdf2::verify(ALGORITHM, ITERATIONS, &self.salt, plaintext.as_bytes(), &self.hash).is_ok()
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(<hashed>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_only_the_original_plaintext() {
        let password = Password::set("pa55word-long").unwrap();
        assert!(password.matches("pa55word-long"));
        assert!(!password.matches("pa55word-lonG"));
        assert!(!password.matches(""));
    }

    #[test]
    fn same_plaintext_gets_distinct_salts() {
        let a = Password::set("correct horse").unwrap();
        let b = Password::set("correct horse").unwrap();
        assert_ne!(a, b);
        assert!(a.matches("correct horse") && b.matches("correct horse"));
    }

    #[test]
    fn survives_serialization() {
        let password = Password::set("battery staple").unwrap();
        let json = serde_json::to_vec(&password).unwrap();
        let restored: Password = serde_json::from_slice(&json).unwrap();
        assert!(restored.matches("battery staple"));
    }
}
