//! One-time verification codes.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use std::fmt::Debug;

/// Number of digits in a verification code.
pub const CODE_LENGTH: usize = 6;

/// Source of verification codes.
pub trait CodeGenerator: Send + Sync + Debug {
    fn generate(&self) -> String;
}

/// Draws each digit from the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRngCodes;

impl CodeGenerator for OsRngCodes {
    fn generate(&self) -> String {
        (0..CODE_LENGTH)
            .map(|_| char::from(b'0' + OsRng.gen_range(0..10u8)))
            .collect()
    }
}

/// An outstanding request to link a chat account to a game account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingVerification {
    pub chat_id: String,
    pub game_account: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl PendingVerification {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_six_digits() {
        let codes = OsRngCodes;
        for _ in 0..32 {
            let code = codes.generate();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
