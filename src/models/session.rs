use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated principal as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Local, short-lived mirror of an authenticated session. The token material
/// is opaque to the application; it is only forwarded back to the provider
/// and the storage backend on each call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user: User,
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

/// Session-change notification, the local analogue of the provider's
/// auth-state stream. Broadcast by the identity service whenever a sign-in,
/// sign-out or token refresh passes through this application.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    SignedIn(Session),
    SignedOut { user_id: String },
    TokenRefreshed(Session),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_deserializes_with_missing_profile_fields() {
        let user: User = serde_json::from_str(
            r#"{"id": "user_1", "email": "a@example.com"}"#,
        )
        .unwrap();
        assert_eq!(user.id, "user_1");
        assert!(user.display_name.is_none());
        assert!(user.created_at.is_none());
    }
}
