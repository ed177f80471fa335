//! Bearer credentials shared by every outgoing request

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Process-wide bearer token
///
/// Clones share the same slot, so a token refreshed through one clone is
/// picked up by every transport and API client holding another.
#[derive(Clone, Default)]
pub struct Credentials(Arc<RwLock<Option<String>>>);

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.0.read().is_some() { "<set>" } else { "<none>" };
        f.debug_tuple("Credentials").field(&state).finish()
    }
}

impl Credentials {
    /// Start with an optional token
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self(Arc::new(RwLock::new(token.filter(|t| !t.is_empty()))))
    }

    /// Replace the token
    pub fn set(&self, token: impl Into<String>) {
        *self.0.write() = Some(token.into());
    }

    /// Forget the token
    pub fn clear(&self) {
        *self.0.write() = None;
    }

    /// Current token, if any
    #[must_use]
    pub fn bearer(&self) -> Option<String> {
        self.0.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_token() {
        let credentials = Credentials::new(None);
        let other = credentials.clone();
        other.set("abc");
        assert_eq!(credentials.bearer().as_deref(), Some("abc"));

        credentials.clear();
        assert_eq!(other.bearer(), None);
    }

    #[test]
    fn test_empty_token_is_none() {
        assert_eq!(Credentials::new(Some(String::new())).bearer(), None);
    }

    #[test]
    fn test_debug_redacts_token() {
        let credentials = Credentials::new(Some("secret".to_string()));
        assert!(!format!("{credentials:?}").contains("secret"));
    }
}
