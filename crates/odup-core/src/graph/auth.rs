//! App-only (client credentials) access tokens for Microsoft Graph.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::http::{self, Method};
use super::parse;
use crate::config::Credentials;
use crate::retry::UploadError;

/// Scope requested for app-only Graph access.
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Something that can hand out a bearer token for the storage API.
pub trait TokenSource: Send + Sync {
    fn bearer_token(&self) -> Result<String, UploadError>;
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Client-credentials grant against the identity platform token endpoint,
/// with an in-memory cache shared by all uploads.
pub struct ClientCredentials {
    token_url: String,
    form: String,
    cache: Mutex<Option<CachedToken>>,
}

impl ClientCredentials {
    pub fn new(creds: &Credentials, login_base_url: &str) -> Self {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            login_base_url.trim_end_matches('/'),
            creds.tenant_id
        );
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &creds.client_id)
            .append_pair("client_secret", &creds.client_secret)
            .append_pair("scope", GRAPH_SCOPE)
            .append_pair("grant_type", "client_credentials")
            .finish();
        Self {
            token_url,
            form,
            cache: Mutex::new(None),
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    fn lock(&self) -> MutexGuard<'_, Option<CachedToken>> {
        self.cache.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn fetch(&self) -> Result<CachedToken, UploadError> {
        let headers = ["Content-Type: application/x-www-form-urlencoded".to_string()];
        let resp = http::request(Method::Post, &self.token_url, &headers, self.form.as_bytes())?;
        if !resp.is_success() {
            return Err(parse::error_from_response(resp.status, &resp.body));
        }
        let (value, expires_in) = parse::parse_token(&resp.body)?;
        let lifetime = Duration::from_secs(expires_in).saturating_sub(REFRESH_MARGIN);
        tracing::debug!(expires_in, "acquired access token");
        Ok(CachedToken {
            value,
            refresh_at: Instant::now() + lifetime,
        })
    }
}

impl TokenSource for ClientCredentials {
    fn bearer_token(&self) -> Result<String, UploadError> {
        // Held across the fetch so concurrent uploads share one refresh.
        let mut cache = self.lock();
        if let Some(tok) = cache.as_ref() {
            if Instant::now() < tok.refresh_at {
                return Ok(tok.value.clone());
            }
        }
        let fresh = self.fetch()?;
        let value = fresh.value.clone();
        *cache = Some(fresh);
        Ok(value)
    }
}
