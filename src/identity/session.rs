use std::collections::HashMap;

use uuid::Uuid;

/// In-process session table: opaque bearer token -> user id. Tokens are
/// minted at login and die with the process.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<String, Uuid>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, user_id: Uuid) -> String {
        let token = Uuid::new_v4().to_string();
        self.sessions.insert(token.clone(), user_id);
        token
    }

    pub fn resolve(&self, token: &str) -> Option<Uuid> {
        self.sessions.get(token).copied()
    }

    /// Idempotent; revoking an unknown token is a no-op.
    pub fn revoke(&mut self, token: &str) {
        self.sessions.remove(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_resolve_until_revoked() {
        let mut sessions = SessionManager::new();
        let user_id = Uuid::new_v4();
        let token = sessions.create(user_id);

        assert_eq!(sessions.resolve(&token), Some(user_id));

        sessions.revoke(&token);
        assert_eq!(sessions.resolve(&token), None);

        // Double revoke is a no-op.
        sessions.revoke(&token);
    }

    #[test]
    fn unknown_tokens_do_not_resolve() {
        let sessions = SessionManager::new();
        assert_eq!(sessions.resolve("not-a-token"), None);
    }
}
