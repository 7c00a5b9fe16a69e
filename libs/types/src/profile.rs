//! User profile and identity types
//!
//! Profiles are owned by the identity subsystem; the ledger core holds
//! read-only copies and treats them as immutable for the session.

use crate::ids::UserId;
use serde::{Deserialize, Serialize};

/// A resolved user profile.
///
/// Immutable except for the display name, which the identity subsystem may
/// update out of band. The core never writes profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    /// Unix nanoseconds timestamp
    pub created_at: i64,
}

impl UserProfile {
    pub fn new(
        user_id: UserId,
        email: impl Into<String>,
        display_name: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            user_id,
            email: email.into(),
            display_name: display_name.into(),
            created_at,
        }
    }
}

/// The identity provider's view of the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    /// Whether the identity provider has verified the account email.
    pub email_verified: bool,
}

impl Identity {
    pub fn new(user_id: UserId, email_verified: bool) -> Self {
        Self {
            user_id,
            email_verified,
        }
    }

    /// A verified identity for the given user id.
    pub fn verified(user_id: impl Into<UserId>) -> Self {
        Self::new(user_id.into(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_creation() {
        let profile = UserProfile::new(
            UserId::new("alice"),
            "alice@example.com",
            "Alice",
            1708123456789000000,
        );
        assert_eq!(profile.user_id.as_str(), "alice");
        assert_eq!(profile.display_name, "Alice");
    }

    #[test]
    fn test_profile_serialization() {
        let profile = UserProfile::new(
            UserId::new("bob"),
            "bob@example.com",
            "Bob",
            1708123456789000000,
        );
        let json = serde_json::to_string(&profile).unwrap();
        let deserialized: UserProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(profile, deserialized);
    }

    #[test]
    fn test_verified_identity() {
        let identity = Identity::verified("carol");
        assert!(identity.email_verified);
        assert_eq!(identity.user_id.as_str(), "carol");
    }
}
