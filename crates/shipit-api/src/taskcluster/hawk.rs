// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hawk request signing (HMAC-SHA256, header mode, no payload hash).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distributions::Alphanumeric;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Taskcluster client credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub access_token: String,
}

/// Parts of a request covered by the signature.
#[derive(Debug, Clone)]
pub struct SignedRequest<'a> {
    pub method: &'a str,
    /// Path and query.
    pub resource: &'a str,
    pub host: &'a str,
    pub port: u16,
}

/// Random nonce for one request.
pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

fn normalized_string(request: &SignedRequest<'_>, ts: i64, nonce: &str, ext: Option<&str>) -> String {
    format!(
        "hawk.1.header\n{}\n{}\n{}\n{}\n{}\n{}\n\n{}\n",
        ts,
        nonce,
        request.method.to_uppercase(),
        request.resource,
        request.host.to_lowercase(),
        request.port,
        ext.unwrap_or(""),
    )
}

/// Base64 HMAC of the normalized request string.
pub fn mac(
    credentials: &Credentials,
    request: &SignedRequest<'_>,
    ts: i64,
    nonce: &str,
    ext: Option<&str>,
) -> String {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(credentials.access_token.as_bytes())
        .unwrap_or_else(|_| unreachable!());
    mac.update(normalized_string(request, ts, nonce, ext).as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Value of the `Authorization` header.
pub fn authorization_header(
    credentials: &Credentials,
    request: &SignedRequest<'_>,
    ts: i64,
    nonce: &str,
    ext: Option<&str>,
) -> String {
    let mac = mac(credentials, request, ts, nonce, ext);
    match ext {
        Some(ext) => format!(
            "Hawk id=\"{}\", ts=\"{}\", nonce=\"{}\", ext=\"{}\", mac=\"{}\"",
            credentials.client_id, ts, nonce, ext, mac
        ),
        None => format!(
            "Hawk id=\"{}\", ts=\"{}\", nonce=\"{}\", mac=\"{}\"",
            credentials.client_id, ts, nonce, mac
        ),
    }
}
