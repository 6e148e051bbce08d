//! Random token generation and the hashed keys derived from them.

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

const OTP_LEN: usize = 8;
/// 43 alphanumeric characters carry just over 256 bits of entropy.
const TEMP_TOKEN_LEN: usize = 43;
const SESSION_ID_LEN: usize = 32;
const ANON_ID_LEN: usize = 32;

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generates the one-time passcode the user types into the questionnaire.
pub fn generate_otp() -> String {
    random_alphanumeric(OTP_LEN)
}

/// Generates the temp token bound to the client through a cookie.
pub fn generate_temp_token() -> String {
    random_alphanumeric(TEMP_TOKEN_LEN)
}

pub fn generate_session_id() -> String {
    random_alphanumeric(SESSION_ID_LEN)
}

/// Identifies a browser across its anonymous and signed-in sessions.
pub fn generate_anon_id() -> String {
    random_alphanumeric(ANON_ID_LEN).to_lowercase()
}

/// Cache key of an OTP record.
pub fn otp_key(otp: &str) -> String {
    format!("otp:{otp}")
}

/// SHA-256 of a secret token, used so raw tokens never become store keys.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct TokenHash(String);

impl TokenHash {
    pub fn of(token: &str) -> Self {
        let digest = Sha256::digest(token.as_bytes());
        Self(hex::encode(&digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the handshake state record for this token.
    pub fn state_key(&self) -> String {
        format!("temp_token_state:{}", self.0)
    }

    /// Key of the verification-attempt counter for this token.
    pub fn attempts_key(&self) -> String {
        format!("verify_attempts:{}", self.0)
    }

    pub fn session_key(&self) -> String {
        format!("session:{}", self.0)
    }
}

impl std::fmt::Display for TokenHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only show first 8 chars for privacy
        write!(f, "{}...", &self.0[..8.min(self.0.len())])
    }
}

mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_lengths_and_alphabet() {
        let otp = generate_otp();
        assert_eq!(otp.len(), OTP_LEN);
        assert!(otp.chars().all(|c| c.is_ascii_alphanumeric()));

        assert_eq!(generate_temp_token().len(), TEMP_TOKEN_LEN);
        assert_ne!(generate_temp_token(), generate_temp_token());
    }

    #[test]
    fn test_token_hash_is_stable_sha256() {
        let hash = TokenHash::of("abc");
        assert_eq!(
            hash.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash, TokenHash::of("abc"));
        assert_ne!(hash, TokenHash::of("abd"));
    }

    #[test]
    fn test_keys() {
        let hash = TokenHash::of("abc");
        assert!(hash.state_key().starts_with("temp_token_state:ba7816bf"));
        assert!(hash.attempts_key().starts_with("verify_attempts:ba7816bf"));
        assert_eq!(otp_key("XyZ12345"), "otp:XyZ12345");
        assert_eq!(hash.to_string(), "ba7816bf...");
    }
}
