// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request authentication
//!
//! Two kinds of callers reach the admin API:
//! - people using the release UI, with an OIDC bearer token; their groups
//!   claim maps onto shipit scopes
//! - automation with Taskcluster credentials, signing requests with Hawk;
//!   the Taskcluster auth service returns their scopes
//!
//! Anything else is anonymous and holds no permission.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};
use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use shipit_core::scopes::{scope_match, scopes_for_groups};

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::state::AppState;
use crate::taskcluster::{HawkRequest, Taskcluster};

/// Identifier of unauthenticated callers.
pub const ANONYMOUS_ID: &str = "anonymous:";

const JWKS_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

/// An authenticated (or anonymous) caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Principal {
    Oidc {
        email: String,
        groups: Vec<String>,
        /// Shipit scopes granted through `groups`.
        scopes: Vec<String>,
    },
    Taskcluster {
        client_id: String,
        scopes: Vec<String>,
    },
    Anonymous,
}

impl Principal {
    /// Identifier recorded in `completed_by` columns.
    pub fn id(&self) -> &str {
        match self {
            Principal::Oidc { email, .. } => email,
            Principal::Taskcluster { client_id, .. } => client_id,
            Principal::Anonymous => ANONYMOUS_ID,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Principal::Anonymous)
    }

    pub fn is_taskcluster(&self) -> bool {
        matches!(self, Principal::Taskcluster { .. })
    }

    pub fn groups(&self) -> &[String] {
        match self {
            Principal::Oidc { groups, .. } => groups,
            _ => &[],
        }
    }

    pub fn permissions(&self) -> &[String] {
        match self {
            Principal::Oidc { scopes, .. } | Principal::Taskcluster { scopes, .. } => scopes,
            Principal::Anonymous => &[],
        }
    }

    /// Taskcluster scopes use `*` suffix matching, OIDC scopes must match
    /// exactly.
    pub fn has_permission(&self, required: &str) -> bool {
        match self {
            Principal::Oidc { scopes, .. } => scopes.iter().any(|s| s == required),
            Principal::Taskcluster { scopes, .. } => scope_match(scopes, required),
            Principal::Anonymous => false,
        }
    }

    pub fn require_permission(&self, required: &str) -> Result<()> {
        if self.has_permission(required) {
            return Ok(());
        }
        warn!(user = %self.id(), permission = %required, "Missing permission");
        Err(Error::Unauthorized(format!(
            "required permission: {}, user permissions: {}",
            required,
            self.permissions().join(", ")
        )))
    }
}

impl FromRequestParts<AppState> for Principal {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(state.authenticator.authenticate(parts).await)
    }
}

// ============================================================================
// OIDC
// ============================================================================

struct JwksCache {
    keys: HashMap<String, DecodingKey>,
    last_refresh: Instant,
}

/// Claims read from access tokens and userinfo responses.
#[derive(Debug, Deserialize)]
struct Claims {
    email: Option<String>,
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<JwkKey>,
}

#[derive(Debug, Deserialize)]
struct JwkKey {
    kty: String,
    kid: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

/// Identity carried by a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcIdentity {
    pub email: String,
    pub groups: Vec<String>,
}

/// Validates bearer tokens, either as JWTs against the issuer's JWKS or,
/// without a JWKS URL, through the userinfo endpoint.
pub struct OidcValidator {
    config: AuthConfig,
    jwks_cache: Arc<RwLock<Option<JwksCache>>>,
    http_client: reqwest::Client,
}

impl OidcValidator {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            jwks_cache: Arc::new(RwLock::new(None)),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    fn issuer(&self, domain: &str) -> String {
        format!("https://{}/", domain.trim_end_matches('/'))
    }

    pub async fn validate(&self, token: &str) -> Result<OidcIdentity> {
        let domain = self
            .config
            .domain
            .as_deref()
            .ok_or_else(|| Error::Unauthorized("OIDC not configured".into()))?;

        let claims = match &self.config.jwks_url {
            Some(jwks_url) => self.decode_jwt(token, domain, jwks_url).await?,
            None => self.userinfo(token, domain).await?,
        };

        let email = claims
            .email
            .ok_or_else(|| Error::Unauthorized("Missing required claim: email".into()))?;
        let groups = match claims.extra.get(&self.config.groups_claim) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
            Some(Value::String(group)) => vec![group.clone()],
            _ => Vec::new(),
        };

        debug!(email = %email, groups = ?groups, "Validated OIDC token");
        Ok(OidcIdentity { email, groups })
    }

    async fn decode_jwt(&self, token: &str, domain: &str, jwks_url: &str) -> Result<Claims> {
        let header = decode_header(token)?;
        let key = self.get_decoding_key(header.kid.as_deref(), jwks_url).await?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[self.issuer(domain)]);
        match &self.config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation.validate_exp = true;

        Ok(decode::<Claims>(token, &key, &validation)?.claims)
    }

    async fn userinfo(&self, token: &str, domain: &str) -> Result<Claims> {
        let url = format!("{}userinfo", self.issuer(domain));
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::Unauthorized(format!("Userinfo request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::Unauthorized(format!(
                "Userinfo rejected the token with status {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Unauthorized(format!("Invalid userinfo response: {}", e)))
    }

    async fn get_decoding_key(&self, kid: Option<&str>, jwks_url: &str) -> Result<DecodingKey> {
        let needs_refresh = {
            let cache = self.jwks_cache.read().await;
            match &*cache {
                None => true,
                Some(c) => {
                    c.last_refresh.elapsed() > JWKS_REFRESH_INTERVAL
                        || kid.is_some_and(|kid| !c.keys.contains_key(kid))
                }
            }
        };
        if needs_refresh {
            self.refresh_jwks(jwks_url).await?;
        }

        let cache = self.jwks_cache.read().await;
        let cache = cache
            .as_ref()
            .ok_or_else(|| Error::Internal("JWKS cache empty after refresh".into()))?;
        let key = match kid {
            Some(kid) => cache.keys.get(kid).cloned(),
            None => cache.keys.values().next().cloned(),
        };
        key.ok_or_else(|| {
            Error::Unauthorized(format!("No matching key found in JWKS for kid: {:?}", kid))
        })
    }

    async fn refresh_jwks(&self, jwks_url: &str) -> Result<()> {
        debug!(url = %jwks_url, "Fetching JWKS");
        let jwks: JwksDocument = self
            .http_client
            .get(jwks_url)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("Failed to fetch JWKS: {}", e)))?
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Invalid JWKS response: {}", e)))?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            if jwk.kty != "RSA" {
                warn!(kty = %jwk.kty, "Unsupported key type");
                continue;
            }
            let (Some(n), Some(e)) = (&jwk.n, &jwk.e) else {
                warn!(kid = ?jwk.kid, "RSA key without components");
                continue;
            };
            let key = DecodingKey::from_rsa_components(n, e)
                .map_err(|e| Error::Internal(format!("Invalid RSA key: {}", e)))?;
            keys.insert(jwk.kid.unwrap_or_else(|| "default".to_string()), key);
        }
        if keys.is_empty() {
            return Err(Error::Internal("No usable keys found in JWKS".into()));
        }

        info!(key_count = keys.len(), "Refreshed JWKS cache");
        *self.jwks_cache.write().await = Some(JwksCache {
            keys,
            last_refresh: Instant::now(),
        });
        Ok(())
    }
}

// ============================================================================
// Request authentication
// ============================================================================

/// Resolves the [`Principal`] of a request.
pub struct Authenticator {
    oidc: Option<OidcValidator>,
    taskcluster: Arc<dyn Taskcluster>,
    admin_group: String,
}

impl Authenticator {
    pub fn new(auth: &AuthConfig, taskcluster: Arc<dyn Taskcluster>, admin_group: &str) -> Self {
        Self {
            oidc: auth.domain.is_some().then(|| OidcValidator::new(auth.clone())),
            taskcluster,
            admin_group: admin_group.to_string(),
        }
    }

    /// Principal of a request; failed authentication is anonymous.
    pub async fn authenticate(&self, parts: &Parts) -> Principal {
        let Some(authorization) = authorization_header(&parts.headers) else {
            return Principal::Anonymous;
        };

        if authorization.starts_with("Hawk") {
            return self.authenticate_hawk(parts, authorization).await;
        }

        if let Some(token) = extract_bearer_token(authorization) {
            let Some(oidc) = &self.oidc else {
                debug!("Bearer token received but OIDC is not configured");
                return Principal::Anonymous;
            };
            return match oidc.validate(token).await {
                Ok(identity) => self.oidc_principal(identity),
                Err(e) => {
                    warn!(error = %e, "Invalid bearer token");
                    Principal::Anonymous
                }
            };
        }
        Principal::Anonymous
    }

    pub fn oidc_principal(&self, identity: OidcIdentity) -> Principal {
        let scopes = scopes_for_groups(&identity.groups, &self.admin_group)
            .into_iter()
            .collect();
        info!(user = %identity.email, "Authenticated user");
        Principal::Oidc {
            email: identity.email,
            groups: identity.groups,
            scopes,
        }
    }

    async fn authenticate_hawk(&self, parts: &Parts, authorization: &str) -> Principal {
        let request = hawk_request(parts, authorization);
        match self.taskcluster.authenticate_hawk(&request).await {
            Ok(identity) => {
                info!(client_id = %identity.client_id, "Authenticated Taskcluster client");
                Principal::Taskcluster {
                    client_id: identity.client_id,
                    scopes: identity.scopes,
                }
            }
            Err(e) => {
                warn!(error = %e, resource = %request.resource, host = %request.host, "Taskcluster authentication failed");
                Principal::Anonymous
            }
        }
    }
}

fn authorization_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Token of a `Bearer` authorization value.
pub fn extract_bearer_token(authorization: &str) -> Option<&str> {
    let mut parts = authorization.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;
    (scheme.eq_ignore_ascii_case("bearer") && parts.next().is_none()).then_some(token)
}

/// The request as the Taskcluster auth service checks it: path, lowercase
/// method, and the host and port the client signed for.
fn hawk_request(parts: &Parts, authorization: &str) -> HawkRequest {
    let headers = &parts.headers;
    let host_header = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.host())
        .unwrap_or_default();

    let (host, port) = match host_header.rsplit_once(':') {
        Some((host, port)) if port.parse::<u16>().is_ok() => {
            (host.to_string(), port.parse().unwrap_or(80))
        }
        _ => {
            let forwarded_port = headers
                .get("X-Forwarded-Port")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let https = headers
                .get("X-Forwarded-Proto")
                .and_then(|v| v.to_str().ok())
                .map(|proto| proto == "https")
                .unwrap_or(parts.uri.scheme_str() == Some("https"));
            let port = forwarded_port.unwrap_or(if https { 443 } else { 80 });
            (host_header.to_string(), port)
        }
    };

    HawkRequest {
        resource: parts.uri.path().to_string(),
        method: parts.method.as_str().to_lowercase(),
        host,
        port,
        authorization: authorization.to_string(),
    }
}
