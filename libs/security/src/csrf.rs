use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::SharedSessionStorage;

/// Request header carrying the token on every outbound widget call.
pub const ANTI_FORGERY_HEADER: &str = "X-CSRF-Token";
pub const TOKEN_STORAGE_KEY: &str = "rooom_csrf_token";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TokenFormat {
    #[default]
    Uuid,
    /// 32 random bytes, hex encoded.
    RandomHex,
}

pub fn generate_token(format: TokenFormat) -> String {
    match format {
        TokenFormat::Uuid => Uuid::new_v4().to_string(),
        TokenFormat::RandomHex => hex::encode(rand::random::<[u8; 32]>()),
    }
}

/// Per-tab anti-forgery token, created on first use and kept in session
/// storage. When storage is unavailable a fresh token is produced per call.
#[derive(Clone)]
pub struct AntiForgery {
    storage: SharedSessionStorage,
    format: TokenFormat,
    creating: Arc<Mutex<()>>,
}

impl AntiForgery {
    pub fn new(storage: SharedSessionStorage) -> Self {
        Self {
            storage,
            format: TokenFormat::default(),
            creating: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_format(mut self, format: TokenFormat) -> Self {
        self.format = format;
        self
    }

    pub fn token(&self) -> String {
        let _guard = self.creating.lock().unwrap_or_else(PoisonError::into_inner);
        match self.storage.get(TOKEN_STORAGE_KEY) {
            Ok(Some(token)) if !token.is_empty() => token,
            Ok(_) => {
                let token = generate_token(self.format);
                if let Err(err) = self.storage.set(TOKEN_STORAGE_KEY, &token) {
                    warn!(
                        target: "security.csrf",
                        error = %err,
                        "could not persist anti-forgery token"
                    );
                }
                token
            }
            Err(err) => {
                debug!(
                    target: "security.csrf",
                    error = %err,
                    "session storage unavailable; using per-call token"
                );
                generate_token(self.format)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::{MemorySessionStorage, UnavailableStorage};

    #[test]
    fn token_is_reused_for_the_session() {
        let storage = MemorySessionStorage::shared();
        let csrf = AntiForgery::new(Arc::clone(&storage));
        let first = csrf.token();
        assert_eq!(first, csrf.token());
        assert_eq!(
            storage.get(TOKEN_STORAGE_KEY).unwrap().as_deref(),
            Some(first.as_str())
        );
        assert!(Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn clones_share_the_token() {
        let csrf = AntiForgery::new(MemorySessionStorage::shared());
        let other = csrf.clone();
        assert_eq!(csrf.token(), other.token());
    }

    #[test]
    fn hex_tokens_are_64_chars() {
        let token = generate_token(TokenFormat::RandomHex);
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn configured_format_is_persisted() {
        let storage = MemorySessionStorage::shared();
        let csrf = AntiForgery::new(Arc::clone(&storage)).with_format(TokenFormat::RandomHex);
        let token = csrf.token();
        assert_eq!(token.len(), 64);
        assert!(Uuid::parse_str(&token).is_err());
        assert_eq!(csrf.token(), token);
    }

    #[test]
    fn unavailable_storage_degrades_to_per_call_tokens() {
        let csrf = AntiForgery::new(Arc::new(UnavailableStorage));
        assert_ne!(csrf.token(), csrf.token());
    }

    #[test]
    fn empty_stored_value_is_replaced() {
        let storage = MemorySessionStorage::shared();
        storage.set(TOKEN_STORAGE_KEY, "").unwrap();
        let token = AntiForgery::new(Arc::clone(&storage)).token();
        assert!(!token.is_empty());
    }
}
