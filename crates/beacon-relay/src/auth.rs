//! Credential authority for relay transactions
//!
//! Checked on every transaction requiring authentication, not once per
//! session. The identity lookup is injected so deployments can back it
//! with whatever store they have; the server ships a static table built
//! from configuration.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info};

use beacon_core::credential::{long_term_key, KEY_SIZE};

/// Pluggable identity -> secret lookup
pub trait CredentialLookup: Send + Sync {
    fn secret(&self, identity: &str) -> Option<String>;
}

/// Static identity table, typically built from the config file
#[derive(Default)]
pub struct StaticCredentials {
    users: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new(users: HashMap<String, String>) -> Self {
        Self { users }
    }

    pub fn insert(&mut self, identity: impl Into<String>, secret: impl Into<String>) {
        self.users.insert(identity.into(), secret.into());
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl CredentialLookup for StaticCredentials {
    fn secret(&self, identity: &str) -> Option<String> {
        self.users.get(identity).cloned()
    }
}

/// Decides whether to issue relay credentials and derives the key material
pub struct CredentialAuthority {
    realm: String,
    lookup: Arc<dyn CredentialLookup>,
}

impl CredentialAuthority {
    pub fn new(realm: String, lookup: Arc<dyn CredentialLookup>) -> Self {
        Self { realm, lookup }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Authenticate a claimed identity for this realm.
    ///
    /// Returns the derived long-term key on success, never the raw secret.
    /// Failures are uniform: the caller (and the wire) cannot tell an
    /// unknown identity from a wrong realm, and the failure log carries no
    /// reason either.
    pub fn authenticate(
        &self,
        identity: &str,
        realm: &str,
        src_addr: SocketAddr,
    ) -> Option<[u8; KEY_SIZE]> {
        let key = if realm == self.realm {
            self.lookup
                .secret(identity)
                .map(|secret| long_term_key(identity, realm, &secret))
        } else {
            None
        };

        match key {
            Some(key) => {
                info!("Authentication succeeded for '{}' from {}", identity, src_addr);
                Some(key)
            }
            None => {
                debug!("Authentication failed for '{}' from {}", identity, src_addr);
                None
            }
        }
    }
}
