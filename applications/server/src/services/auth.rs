/// Authentication service - Basic and Digest (RFC 2617) credential checks
use crate::config::{AuthScheme, AuthSettings};
use base64::{engine::general_purpose::STANDARD, Engine};
use http::HeaderValue;
use lru::LruCache;
use md5::{Digest, Md5};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use uuid::Uuid;

/// Issued digest nonces remembered at once
const NONCE_CAPACITY: usize = 256;

/// Source of truth for passwords
pub trait CredentialCheck: Send + Sync {
    /// Password for `username`, or `None` when the user is not allowed in
    fn password(&self, username: &str) -> Option<String>;
}

/// One password, optionally bound to one user name
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    username: Option<String>,
    password: String,
}

impl StaticCredentials {
    pub fn new(username: Option<String>, password: impl Into<String>) -> Self {
        Self {
            username,
            password: password.into(),
        }
    }
}

impl CredentialCheck for StaticCredentials {
    fn password(&self, username: &str) -> Option<String> {
        match &self.username {
            Some(expected) if expected != username => None,
            _ => Some(self.password.clone()),
        }
    }
}

/// Result of checking a request's credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Granted,
    /// Rejected; send this `WWW-Authenticate` value with a 401
    Challenge(HeaderValue),
}

pub struct AuthService {
    scheme: AuthScheme,
    realm: String,
    credentials: Arc<dyn CredentialCheck>,
    nonces: Mutex<LruCache<String, ()>>,
}

impl AuthService {
    pub fn new(scheme: AuthScheme, realm: impl Into<String>, credentials: Arc<dyn CredentialCheck>) -> Self {
        let capacity = NonZeroUsize::new(NONCE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            scheme,
            realm: realm.into(),
            credentials,
            nonces: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Service for the configured scheme with a single static password
    pub fn from_settings(settings: &AuthSettings) -> Self {
        let credentials = StaticCredentials::new(settings.username.clone(), settings.password.clone());
        Self::new(settings.scheme, settings.realm.clone(), Arc::new(credentials))
    }

    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    pub fn is_enabled(&self) -> bool {
        self.scheme != AuthScheme::None
    }

    /// Check an `Authorization` header for a request to `uri`
    pub fn check(&self, authorization: Option<&str>, uri: &str) -> AuthOutcome {
        let granted = match self.scheme {
            AuthScheme::None => true,
            AuthScheme::Basic => authorization
                .and_then(|h| strip_scheme(h, "Basic"))
                .is_some_and(|encoded| self.verify_basic(encoded)),
            AuthScheme::Digest => authorization
                .and_then(|h| strip_scheme(h, "Digest"))
                .is_some_and(|params| self.verify_digest(params, uri)),
        };

        if granted {
            AuthOutcome::Granted
        } else {
            tracing::debug!(scheme = ?self.scheme, "Rejected credentials");
            AuthOutcome::Challenge(self.challenge())
        }
    }

    /// A fresh `WWW-Authenticate` value
    pub fn challenge(&self) -> HeaderValue {
        let value = match self.scheme {
            AuthScheme::Digest => format!(
                "Digest realm=\"{}\", nonce=\"{}\", qop=\"auth\", algorithm=MD5",
                self.realm,
                self.issue_nonce()
            ),
            _ => format!("Basic realm=\"{}\"", self.realm),
        };
        HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("Basic"))
    }

    /// Create and remember a digest nonce
    pub fn issue_nonce(&self) -> String {
        let nonce = Uuid::new_v4().simple().to_string();
        self.nonces.lock().put(nonce.clone(), ());
        nonce
    }

    fn verify_basic(&self, encoded: &str) -> bool {
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        let Some((username, password)) = decoded.split_once(':') else {
            return false;
        };
        self.credentials
            .password(username)
            .is_some_and(|expected| expected == password)
    }

    fn verify_digest(&self, params: &str, uri: &str) -> bool {
        let params = parse_params(params);
        let get = |key: &str| params.get(key).map(String::as_str);

        let (Some(username), Some(nonce), Some(digest_uri), Some(response)) =
            (get("username"), get("nonce"), get("uri"), get("response"))
        else {
            return false;
        };

        if get("realm").is_some_and(|realm| realm != self.realm) || digest_uri != uri {
            return false;
        }
        if self.nonces.lock().get(nonce).is_none() {
            return false;
        }
        let Some(password) = self.credentials.password(username) else {
            return false;
        };

        let ha1 = md5_hex(&format!("{}:{}:{}", username, self.realm, password));
        let ha2 = md5_hex(&format!("GET:{}", digest_uri));
        let expected = match get("qop") {
            Some(qop) => {
                let (Some(nc), Some(cnonce)) = (get("nc"), get("cnonce")) else {
                    return false;
                };
                md5_hex(&format!("{}:{}:{}:{}:{}:{}", ha1, nonce, nc, cnonce, qop, ha2))
            }
            None => md5_hex(&format!("{}:{}:{}", ha1, nonce, ha2)),
        };

        expected.eq_ignore_ascii_case(response)
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("scheme", &self.scheme)
            .field("realm", &self.realm)
            .finish_non_exhaustive()
    }
}

fn strip_scheme<'a>(header: &'a str, scheme: &str) -> Option<&'a str> {
    let (name, rest) = header.trim().split_once(' ')?;
    name.eq_ignore_ascii_case(scheme).then_some(rest)
}

pub(crate) fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

/// Split `key=value, key="quoted, value"` into a map
fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let Some((key, after)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim().trim_start_matches(',').trim().to_ascii_lowercase();
        let after = after.trim_start();

        let (value, remainder) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match after.find(',') {
                Some(end) => (after[..end].trim(), &after[end..]),
                None => (after.trim(), ""),
            }
        };

        params.insert(key, value.to_string());
        rest = remainder.trim_start().trim_start_matches(',').trim_start();
    }

    params
}
