//! Error types and handling for the bridge core.
//!
//! Every operation reachable from a chat command returns a [`BridgeError`] on
//! failure. None of these are fatal: the command layer turns each one into a
//! user-facing reply via [`BridgeError::user_message`].

/// Enumeration of possible bridge errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// Lookup of a pending verification, session or link came up empty
    #[error("no {0} found")]
    NotFound(String),

    /// The verification code was correct but its TTL has elapsed
    #[error("verification code has expired")]
    Expired,

    /// The chat account has no linked game account
    #[error("user is not verified")]
    NotLinked,

    /// Malformed arguments: bad code length, unknown category, missing argument
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The operation is not allowed in the current state
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Immediate ghost activation for an account that is not online
    #[error("{0} is not online")]
    NotOnline(String),

    /// The game process is not running
    #[error("the game server is not running")]
    UpstreamUnavailable,

    /// Durable state could not be written
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl BridgeError {
    /// Renders the error as a chat reply.
    pub fn user_message(&self) -> String {
        match self {
            BridgeError::NotFound(what) => format!("❌ No {what} found."),
            BridgeError::Expired => {
                "❌ Verification failed: the code has expired. Request a new one.".to_string()
            }
            BridgeError::NotLinked => "❌ Your account is not verified.".to_string(),
            BridgeError::InvalidInput(msg) => format!("❌ {msg}"),
            BridgeError::PreconditionFailed(msg) => format!("❌ {msg}"),
            BridgeError::NotOnline(name) => format!(
                "❌ **{name}** must be online in the game to activate ghost mode. Use `ghost prelogin` to activate on the next join."
            ),
            BridgeError::UpstreamUnavailable => "❌ The game server is not running.".to_string(),
            BridgeError::Persistence(msg) => format!("⚠️ State could not be saved: {msg}"),
        }
    }
}

impl From<crate::store::StoreError> for BridgeError {
    fn from(e: crate::store::StoreError) -> Self {
        BridgeError::Persistence(e.to_string())
    }
}

/// Convenience alias used throughout the core.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn test_store_errors_become_persistence() {
        let json = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = BridgeError::from(StoreError::Json(json));
        assert!(matches!(err, BridgeError::Persistence(_)));
        assert!(err.user_message().starts_with("⚠️ State could not be saved: JSON error"));
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            BridgeError::NotFound("pending verification".to_string()).user_message(),
            "❌ No pending verification found."
        );
        assert!(BridgeError::NotOnline("Alice".to_string())
            .user_message()
            .contains("**Alice** must be online"));
    }
}
