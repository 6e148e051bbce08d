//! Password strength rules and argon2 hashing.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;

static LOWERCASE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z]").unwrap());
static UPPERCASE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Z]").unwrap());
static DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").unwrap());

static COMMON_PASSWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    include_str!("../../data/common_passwords.txt")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("Password must be equal to or more than {min} characters long.")]
    TooShort { min: usize },

    #[error("Password must be equal to or less than {max} characters long.")]
    TooLong { max: usize },

    #[error("Password must contain at least one uppercase letter, one lowercase letter, and one numeric digit.")]
    MissingCharacterClass,

    #[error("This password is too common.")]
    TooCommon,

    #[error("The password is too similar to the username.")]
    TooSimilar,
}

#[derive(Debug, Clone, Copy)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
}

impl PasswordPolicy {
    /// Checks `password` against the policy. `account` feeds the similarity check.
    pub fn validate(&self, password: &str, account: Option<&str>) -> Result<(), PasswordError> {
        let length = password.chars().count();
        if length < self.min_length {
            return Err(PasswordError::TooShort {
                min: self.min_length,
            });
        }
        if length > self.max_length {
            return Err(PasswordError::TooLong {
                max: self.max_length,
            });
        }

        if !(LOWERCASE.is_match(password) && UPPERCASE.is_match(password) && DIGIT.is_match(password))
        {
            return Err(PasswordError::MissingCharacterClass);
        }

        let lowered = password.to_lowercase();
        if COMMON_PASSWORDS.contains(lowered.as_str()) {
            return Err(PasswordError::TooCommon);
        }

        if let Some(account) = account.map(str::to_lowercase).filter(|a| a.len() >= 3) {
            if lowered.contains(&account) {
                return Err(PasswordError::TooSimilar);
            }
        }

        Ok(())
    }
}

/// Hashes a password into a PHC string.
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| e.to_string())
}

/// Checks a password against a stored PHC string. Malformed hashes never match.
pub fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: PasswordPolicy = PasswordPolicy {
        min_length: 10,
        max_length: 32,
    };

    #[test]
    fn test_accepts_strong_password() {
        assert_eq!(POLICY.validate("Tr0ub4dor&3x", Some("alice")), Ok(()));
    }

    #[test]
    fn test_rejects_short_and_long() {
        assert_eq!(
            POLICY.validate("Ab1", None),
            Err(PasswordError::TooShort { min: 10 })
        );
        let long = format!("Ab1{}", "x".repeat(40));
        assert_eq!(
            POLICY.validate(&long, None),
            Err(PasswordError::TooLong { max: 32 })
        );
    }

    #[test]
    fn test_rejects_missing_character_classes() {
        for pw in ["alllowercase1", "ALLUPPERCASE1", "NoDigitsHere", "1234567890"] {
            assert_eq!(
                POLICY.validate(pw, None),
                Err(PasswordError::MissingCharacterClass),
                "{pw}"
            );
        }
    }

    #[test]
    fn test_rejects_common_password_case_insensitively() {
        assert_eq!(
            POLICY.validate("Password123", None),
            Err(PasswordError::TooCommon)
        );
    }

    #[test]
    fn test_rejects_password_containing_account() {
        assert_eq!(
            POLICY.validate("Xjtu2024Alice!", Some("alice")),
            Err(PasswordError::TooSimilar)
        );
    }

    #[test]
    fn test_hash_roundtrip() {
        let hash = hash_password("Tr0ub4dor&3x").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Tr0ub4dor&3x", &hash));
        assert!(!verify_password("tr0ub4dor&3x", &hash));
        assert!(!verify_password("anything", "not-a-hash"));
    }
}
