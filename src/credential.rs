//! Credential records loaded from storage.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PatternError;
use crate::token::{AccessScope, KeyId, HINT_LEN};

/// One header injected downstream on successful validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// Parameters for provisioning a new credential.
#[derive(Debug, Clone, Default)]
pub struct NewCredential {
    /// Owning user/tenant.
    pub user: String,
    /// Free-form display label.
    pub label: String,
    /// Host glob pattern; empty means any host.
    pub host: String,
    /// Path glob pattern; empty means any path.
    pub path: String,
    /// Headers injected on successful validation.
    pub headers: Vec<Header>,
}

/// A durable credential record, loaded read-only into the validation
/// cache. The secret payload is never part of the record; only its
/// SHA3-384 digest is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Storage-assigned numeric identity.
    pub id: i64,
    /// Unique public identifier of the key.
    pub key_id: KeyId,
    /// SHA3-384 digest of the private payload.
    pub hash: Vec<u8>,
    /// Owning user/tenant.
    pub user: String,
    /// Free-form display label.
    #[serde(default)]
    pub label: String,
    /// Host glob pattern; empty means any host.
    #[serde(default)]
    pub host: String,
    /// Path glob pattern; empty means any path.
    #[serde(default)]
    pub path: String,
    /// Headers injected on successful validation.
    #[serde(default)]
    pub headers: Vec<Header>,
    /// Cumulative validated-request counter, maintained by the stats
    /// aggregator only.
    #[serde(default)]
    pub requests: i64,
    /// Latest observed access time, maintained by the stats aggregator
    /// only.
    #[serde(default)]
    pub last_access_at: Option<DateTime<Utc>>,
    /// Creation timestamp (audit only).
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp (audit only).
    pub updated_at: DateTime<Utc>,

    #[serde(skip)]
    scope: OnceCell<AccessScope>,
}

impl Credential {
    /// Build a record from provisioning parameters, compiling the access
    /// scope eagerly so malformed patterns fail here, at configuration
    /// time, rather than on the validation path.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidPattern`] if the host or path glob
    /// is malformed.
    pub fn new(
        id: i64,
        key_id: KeyId,
        hash: Vec<u8>,
        params: NewCredential,
        now: DateTime<Utc>,
    ) -> Result<Self, PatternError> {
        let scope = AccessScope::compile(&params.host, &params.path)?;
        let cell = OnceCell::new();
        // Freshly compiled; the cell cannot be occupied yet.
        let _ = cell.set(scope);
        Ok(Self {
            id,
            key_id,
            hash,
            user: params.user,
            label: params.label,
            host: params.host,
            path: params.path,
            headers: params.headers,
            requests: 0,
            last_access_at: None,
            created_at: now,
            updated_at: now,
            scope: cell,
        })
    }

    /// Verify a request against this credential's scope and secret hash.
    ///
    /// The compiled scope is memoized on first use. A stored pattern that
    /// fails to compile denies access; provisioning prevents that state
    /// up-front.
    #[must_use]
    pub fn verify(&self, host: &str, path: &str, payload: &[u8]) -> bool {
        let scope = match self
            .scope
            .get_or_try_init(|| AccessScope::compile(&self.host, &self.path))
        {
            Ok(scope) => scope,
            Err(err) => {
                debug!(key_id = %self.key_id, error = %err, "stored pattern failed to compile");
                return false;
            }
        };
        scope.verify(host, path, payload, &self.hash)
    }

    /// Short public-identifier prefix, safe to show in listings.
    #[must_use]
    pub fn hint(&self) -> String {
        let text = self.key_id.to_string();
        text[..HINT_LEN.min(text.len())].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Key;

    fn record(key: &Key, host: &str, path: &str) -> Credential {
        Credential::new(
            1,
            key.id(),
            key.hash(),
            NewCredential {
                user: "admin".into(),
                host: host.into(),
                path: path.into(),
                ..NewCredential::default()
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_verify_matrix() {
        let key = Key::generate().unwrap();
        let wrong = Key::generate().unwrap();
        let cred = record(&key, "*.example.com", "/**");

        assert!(cred.verify("a.example.com", "/x", key.payload()));
        assert!(!cred.verify("example.com", "/x", key.payload()));
        assert!(!cred.verify("a.example.com", "/x", wrong.payload()));
    }

    #[test]
    fn test_new_rejects_bad_patterns() {
        let key = Key::generate().unwrap();
        let spec = NewCredential {
            host: "***".into(),
            ..NewCredential::default()
        };
        assert!(Credential::new(1, key.id(), key.hash(), spec, Utc::now()).is_err());
    }

    #[test]
    fn test_serde_round_trip_preserves_verification() {
        let key = Key::generate().unwrap();
        let cred = record(&key, "", "/guest");
        let json = serde_json::to_string(&cred).unwrap();
        let back: Credential = serde_json::from_str(&json).unwrap();

        assert_eq!(back.key_id, cred.key_id);
        assert!(back.verify("anywhere.io", "/guest", key.payload()));
        assert!(!back.verify("anywhere.io", "/other", key.payload()));
    }

    #[test]
    fn test_hint_is_short_prefix() {
        let key = Key::generate().unwrap();
        let cred = record(&key, "", "");
        let hint = cred.hint();
        assert_eq!(hint.len(), HINT_LEN);
        assert!(cred.key_id.to_string().starts_with(&hint));
    }
}
