//! Identity of the signed-in user
//!
//! The store only needs a user id to namespace keys and to filter out
//! records that belong to someone else.

/// Namespace used when nobody is signed in.
pub const GUEST_NAMESPACE: &str = "guest";

/// Supplies the current user id.
pub trait IdentityProvider: Send + Sync {
    /// `None` when no user is signed in.
    fn current_user_id(&self) -> Option<String>;

    /// Namespace for stored keys: the user id, or [`GUEST_NAMESPACE`].
    fn namespace(&self) -> String {
        self.current_user_id()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| GUEST_NAMESPACE.to_string())
    }
}

/// Fixed identity, decided at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user_id: Option<String>,
}

impl StaticIdentity {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            user_id: Some(id.into()),
        }
    }

    pub fn guest() -> Self {
        Self { user_id: None }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.user_id.clone()
    }
}
