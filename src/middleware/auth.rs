use std::collections::HashMap;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use rand::{rngs::OsRng, rngs::StdRng, RngCore, SeedableRng};

use crate::error::AppError;
use crate::state::AppState;

/// The authenticated caller, inserted into the request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub username: String,
}

/// Bearer tokens per username.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    users: HashMap<String, String>,
}

impl TokenStore {
    pub fn new(users: HashMap<String, String>) -> Self {
        Self { users }
    }

    /// Uses the configured users, or creates a single `admin` user with a
    /// fresh random token when none are configured.
    pub fn from_config(users: &HashMap<String, String>) -> anyhow::Result<Self> {
        if !users.is_empty() {
            return Ok(Self::new(users.clone()));
        }
        let token = generate_token()?;
        tracing::warn!("No users configured; generated token for 'admin': {}", token);
        Ok(Self::new(HashMap::from([("admin".to_string(), token)])))
    }

    /// Returns the user owning `token`. Every configured token is compared so
    /// the time taken does not depend on which one matched.
    pub fn authenticate(&self, token: &str) -> Option<&str> {
        let mut found = None;
        for (user, expected) in &self.users {
            if constant_time_eq(token.as_bytes(), expected.as_bytes()) {
                found = Some(user.as_str());
            }
        }
        found
    }
}

/// 32 random bytes, hex encoded, from a generator seeded by the OS.
pub fn generate_token() -> anyhow::Result<String> {
    let mut rng = StdRng::from_rng(OsRng)?;
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    Ok(hex::encode(bytes))
}

fn constant_time_eq(provided: &[u8], expected: &[u8]) -> bool {
    if provided.len() != expected.len() {
        return false;
    }
    let mut diff = 0u8;
    for (a, b) in provided.iter().zip(expected) {
        diff |= a ^ b;
    }
    diff == 0
}

/// Requires `Authorization: Bearer <token>` and records the caller as
/// [`CurrentUser`].
pub async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;

    let username = state
        .auth
        .authenticate(token.trim())
        .ok_or_else(|| AppError::Unauthorized("invalid token".into()))?
        .to_string();

    req.extensions_mut().insert(CurrentUser { username });
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticate_matches_exact_token() {
        let store = TokenStore::new(HashMap::from([
            ("alice".to_string(), "alice-token-0123456789".to_string()),
            ("bob".to_string(), "bob-token-01234567890".to_string()),
        ]));
        assert_eq!(store.authenticate("alice-token-0123456789"), Some("alice"));
        assert_eq!(store.authenticate("bob-token-01234567890"), Some("bob"));
        assert_eq!(store.authenticate("alice-token-012345678"), None);
        assert_eq!(store.authenticate(""), None);
    }

    #[test]
    fn generated_tokens_differ() {
        let a = generate_token().unwrap();
        let b = generate_token().unwrap();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn empty_config_bootstraps_admin() {
        let store = TokenStore::from_config(&HashMap::new()).unwrap();
        assert_eq!(store.users.len(), 1);
        assert!(store.users.contains_key("admin"));
    }
}
