//! Authenticated identity
//!
//! Sign-in itself is handled by the hosted identity provider. Once it succeeds
//! the shell builds an [`AuthenticatedSession`] and passes it to every
//! operation that acts on behalf of a user.

use serde::{Deserialize, Serialize};

use crate::error::GhostError;
use crate::types::UserId;

/// A signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedSession {
    pub uid: UserId,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl AuthenticatedSession {
    pub fn new(uid: impl Into<UserId>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Name shown to friends; falls back to the email's local part
    pub fn public_name(&self) -> &str {
        match &self.display_name {
            Some(name) if !name.is_empty() => name,
            _ => self.email.split('@').next().unwrap_or(&self.email),
        }
    }
}

/// Fail fast when there is no signed-in user
pub fn require_session(
    session: Option<&AuthenticatedSession>,
) -> Result<&AuthenticatedSession, GhostError> {
    session.ok_or(GhostError::Unauthenticated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_session() {
        let session = AuthenticatedSession::new("u1", "ada@example.com");
        assert_eq!(require_session(Some(&session)).unwrap().uid.as_str(), "u1");
        assert!(matches!(
            require_session(None),
            Err(GhostError::Unauthenticated)
        ));
    }

    #[test]
    fn test_public_name() {
        let session = AuthenticatedSession::new("u1", "ada@example.com");
        assert_eq!(session.public_name(), "ada");

        let named = session.with_display_name("Ada L.");
        assert_eq!(named.public_name(), "Ada L.");
    }
}
