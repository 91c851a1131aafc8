use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use convocore_core::clock::{Clock, SystemClock};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::gemini::model::{GenerateContentRequest, WireContent, WirePart};
use crate::gemini::GeminiClient;

pub const CRED_CACHE_MAX: usize = 100;
const VALIDATION_TTL_MILLIS: u64 = 3_600_000;

/// First 16 hex characters of SHA-256(credential) — a non-reversible
/// cache key. The raw credential is never logged (spec.md §4.4).
pub fn fingerprint(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    let hex = format!("{digest:x}");
    hex[..16].to_string()
}

/// A redacted form safe to log: `first4…last4`.
pub fn sanitize(credential: &str) -> String {
    if credential.len() <= 8 {
        return "***".to_string();
    }
    format!("{}…{}", &credential[..4], &credential[credential.len() - 4..])
}

/// Syntactic validation (spec.md §4.4): non-empty, `AIza` prefix, length
/// in `[39, 100]`, characters in `[A-Za-z0-9_-]`.
pub fn is_syntactically_valid(credential: &str) -> bool {
    !credential.is_empty()
        && credential.starts_with("AIza")
        && (39..=100).contains(&credential.len())
        && credential.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

struct ClientEntry {
    client: Arc<GeminiClient>,
    last_access_millis: u64,
}

struct ValidationEntry {
    valid: bool,
    #[allow(dead_code)]
    reason: Option<String>,
    observed_at_millis: u64,
}

/// Result of [`CredentialCache::get`] (spec.md §4.4 contract).
pub struct ClientHandle {
    pub client: Arc<GeminiClient>,
    pub used_client_key: bool,
}

/// Validated LRU of upstream clients keyed by credential fingerprint
/// (spec.md §4.4).
pub struct CredentialCache {
    server_client: Arc<GeminiClient>,
    model: String,
    clients: Mutex<HashMap<String, ClientEntry>>,
    validations: Mutex<HashMap<String, ValidationEntry>>,
    clock: Arc<dyn Clock>,
    capacity: usize,
}

impl CredentialCache {
    pub fn new(server_client: Arc<GeminiClient>, model: impl Into<String>) -> Self {
        Self::with_clock(server_client, model, Arc::new(SystemClock))
    }

    pub fn with_clock(server_client: Arc<GeminiClient>, model: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            server_client,
            model: model.into(),
            clients: Mutex::new(HashMap::new()),
            validations: Mutex::new(HashMap::new()),
            clock,
            capacity: CRED_CACHE_MAX,
        }
    }

    /// Resolves a client for an optional BYOK credential, falling back to
    /// the server credential on any syntactic or semantic validation
    /// failure (spec.md §4.4).
    pub async fn get(&self, credential: Option<&str>) -> Result<ClientHandle> {
        let Some(credential) = credential.filter(|c| !c.is_empty()) else {
            return Ok(ClientHandle { client: self.server_client.clone(), used_client_key: false });
        };

        if !is_syntactically_valid(credential) {
            tracing::warn!(credential = %sanitize(credential), "credential failed syntactic validation, falling back to server credential");
            return Ok(ClientHandle { client: self.server_client.clone(), used_client_key: false });
        }

        let fp = fingerprint(credential);
        if let Some(valid) = self.cached_validation(&fp) {
            if !valid {
                tracing::warn!(fingerprint = %fp, "credential previously marked invalid, falling back to server credential");
                return Ok(ClientHandle { client: self.server_client.clone(), used_client_key: false });
            }
        } else if let Err(err) = self.probe(credential).await {
            if err.is_auth_failure() {
                self.record_validation(&fp, false, Some(err.to_string()));
                tracing::warn!(fingerprint = %fp, "credential probe returned an auth failure, falling back to server credential");
                return Ok(ClientHandle { client: self.server_client.clone(), used_client_key: false });
            }
            // Non-auth errors (network, quota) leave the key provisionally valid.
            tracing::warn!(fingerprint = %fp, error = %err, "credential probe failed with a non-auth error; proceeding provisionally");
            self.record_validation(&fp, true, None);
        } else {
            self.record_validation(&fp, true, None);
        }

        let client = self.get_or_insert_client(&fp, credential)?;
        Ok(ClientHandle { client, used_client_key: true })
    }

    fn cached_validation(&self, fingerprint: &str) -> Option<bool> {
        let validations = self.validations.lock().unwrap();
        let entry = validations.get(fingerprint)?;
        let now = self.clock.now_millis();
        if now.saturating_sub(entry.observed_at_millis) > VALIDATION_TTL_MILLIS {
            return None;
        }
        Some(entry.valid)
    }

    fn record_validation(&self, fingerprint: &str, valid: bool, reason: Option<String>) {
        let now = self.clock.now_millis();
        self.validations
            .lock()
            .unwrap()
            .insert(fingerprint.to_string(), ValidationEntry { valid, reason, observed_at_millis: now });
    }

    /// A minimal one-token probe used for semantic validation.
    async fn probe(&self, credential: &str) -> crate::gemini::error::Result<()> {
        let client = GeminiClient::new(credential, &self.model)?;
        let request = GenerateContentRequest {
            contents: vec![WireContent { role: "user".to_string(), parts: vec![WirePart::Text { text: "hi".to_string() }] }],
        };
        client.generate_content(&request).await?;
        Ok(())
    }

    fn get_or_insert_client(&self, fingerprint: &str, credential: &str) -> Result<Arc<GeminiClient>> {
        let now = self.clock.now_millis();
        let mut clients = self.clients.lock().unwrap();

        if let Some(entry) = clients.get_mut(fingerprint) {
            entry.last_access_millis = now;
            return Ok(entry.client.clone());
        }

        if clients.len() >= self.capacity {
            if let Some(oldest) = clients.iter().min_by_key(|(_, e)| e.last_access_millis).map(|(k, _)| k.clone()) {
                clients.remove(&oldest);
            }
        }

        let client = Arc::new(GeminiClient::new(credential, &self.model)?);
        clients.insert(fingerprint.to_string(), ClientEntry { client: client.clone(), last_access_millis: now });
        Ok(client)
    }
}

pub fn validation_ttl() -> Duration {
    Duration::from_millis(VALIDATION_TTL_MILLIS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic_and_injective_in_practice() {
        let a = fingerprint("AIzaSyTestKey1234567890123456789012345");
        let b = fingerprint("AIzaSyTestKey1234567890123456789012345");
        let c = fingerprint("AIzaSyOtherKey123456789012345678901234");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn syntactic_validation_boundaries() {
        assert!(!is_syntactically_valid(""));
        assert!(!is_syntactically_valid("short"));
        assert!(!is_syntactically_valid(&"AIza".to_string().repeat(30))); // too long
        let good = format!("AIza{}", "A".repeat(35));
        assert_eq!(good.len(), 39);
        assert!(is_syntactically_valid(&good));
        let bad_prefix = format!("xIza{}", "A".repeat(35));
        assert!(!is_syntactically_valid(&bad_prefix));
    }

    #[test]
    fn sanitize_never_reveals_more_than_first4_last4() {
        let redacted = sanitize("AIzaSyTestKey1234567890123456789012345");
        assert_eq!(redacted, "AIza…2345");
    }
}
