// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Password digests and one-time codes.
//!
//! Passwords are stored as `SHA-256(salt || password)` with a random 16-byte
//! salt per user. All comparisons of secrets are constant time.

use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::domain::user::PasswordHash;

const SALT_LEN: usize = 16;

fn digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

pub fn hash_password(password: &str) -> PasswordHash {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill(&mut salt);
    PasswordHash {
        salt: hex::encode(salt),
        digest: hex::encode(digest(&salt, password)),
    }
}

pub fn verify_password(stored: &PasswordHash, password: &str) -> bool {
    let (Ok(salt), Ok(expected)) = (hex::decode(&stored.salt), hex::decode(&stored.digest)) else {
        return false;
    };
    digest(&salt, password).ct_eq(&expected).into()
}

/// Numeric code of `length` digits, leading zeros allowed.
pub fn generate_code(length: u8) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

pub fn codes_match(expected: &str, given: &str) -> bool {
    expected.as_bytes().ct_eq(given.trim().as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("hunter2");
        assert!(verify_password(&hash, "hunter2"));
        assert!(!verify_password(&hash, "hunter3"));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same");
        let b = hash_password("same");
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.digest, b.digest);
    }

    #[test]
    fn test_corrupt_hash_never_verifies() {
        let hash = PasswordHash { salt: "zz".to_string(), digest: "00".to_string() };
        assert!(!verify_password(&hash, ""));
    }

    #[test]
    fn test_generate_code() {
        let code = generate_code(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
        assert!(codes_match(&code, &format!(" {} ", code)));
        assert!(!codes_match(&code, "abcdef"));
    }
}
