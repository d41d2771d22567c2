//! Boundary middleware chain.
//!
//! Execution order on a request: request logging → trusted-subnet check →
//! decryption → gzip → body integrity → handler. Agents compress first and
//! encrypt second, so the server reverts in the opposite order; the HMAC
//! covers the plaintext body and is verified last, after both reverts.

use crate::state::AppState;
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Instant;
use vitals_crypto::signature;

/// Lowercase-hex HMAC-SHA256 of the plaintext body.
pub static HASH_HEADER: HeaderName = HeaderName::from_static("hashsha256");
/// Set to `1` when the body is RSA-encrypted.
pub static ENCRYPTION_HEADER: HeaderName = HeaderName::from_static("content-encryption");
/// Client address as reported by the agent.
pub static X_REAL_IP_HEADER: HeaderName = HeaderName::from_static("x-real-ip");

/// CIDR allow-list entry, e.g. `10.0.0.0/8` or `fd00::/16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedSubnet {
    network: IpAddr,
    prefix: u8,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid trusted subnet '{0}'")]
pub struct SubnetParseError(String);

impl FromStr for TrustedSubnet {
    type Err = SubnetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| SubnetParseError(s.to_string()))?;

        let addr: IpAddr = addr
            .trim()
            .parse()
            .map_err(|_| SubnetParseError(s.to_string()))?;
        let prefix: u8 = prefix
            .trim()
            .parse()
            .map_err(|_| SubnetParseError(s.to_string()))?;

        let max_prefix = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max_prefix {
            return Err(SubnetParseError(s.to_string()));
        }

        let subnet = Self {
            network: addr,
            prefix,
        };
        Ok(Self {
            network: subnet.mask(addr).unwrap_or(addr),
            prefix,
        })
    }
}

impl TrustedSubnet {
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.mask(ip) == Some(self.network)
    }

    /// Applies the prefix mask; `None` on an address-family mismatch.
    fn mask(&self, ip: IpAddr) -> Option<IpAddr> {
        match (ip, self.network) {
            (IpAddr::V4(ip), IpAddr::V4(_)) => {
                let mask = if self.prefix == 0 {
                    0
                } else {
                    u32::MAX << (32 - self.prefix)
                };
                Some(IpAddr::V4((u32::from(ip) & mask).into()))
            }
            (IpAddr::V6(ip), IpAddr::V6(_)) => {
                let mask = if self.prefix == 0 {
                    0
                } else {
                    u128::MAX << (128 - self.prefix)
                };
                Some(IpAddr::V6((u128::from(ip) & mask).into()))
            }
            _ => None,
        }
    }
}

/// Logs method, path, status and latency for every request.
pub async fn request_logging(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed = ?start.elapsed(),
        "http request"
    );

    response
}

/// Refuses clients whose `X-Real-IP` is missing, unparsable or outside the
/// configured subnet. Pass-through when no subnet is configured.
pub async fn trusted_subnet_check(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(subnet) = state.trusted_subnet else {
        return next.run(req).await;
    };

    let ip = req
        .headers()
        .get(&X_REAL_IP_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok());

    match ip {
        Some(ip) if subnet.contains(ip) => next.run(req).await,
        Some(ip) => {
            tracing::warn!(client = %ip, "client outside trusted subnet");
            (StatusCode::FORBIDDEN, "forbidden").into_response()
        }
        None => {
            tracing::warn!("missing or malformed X-Real-IP header");
            (StatusCode::FORBIDDEN, "forbidden").into_response()
        }
    }
}

/// Decrypts the request body when the agent marked it encrypted.
/// Pass-through when no private key is configured.
pub async fn decrypt_body(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(decryptor) = state.decryptor.clone() else {
        return next.run(req).await;
    };

    let encrypted = req
        .headers()
        .get(&ENCRYPTION_HEADER)
        .and_then(|v| v.to_str().ok())
        == Some("1");
    if !encrypted {
        return next.run(req).await;
    }

    let (parts, body) = req.into_parts();
    let Ok(bytes) = to_bytes(body, usize::MAX).await else {
        return (StatusCode::BAD_REQUEST, "can't read body").into_response();
    };

    match decryptor.decrypt(&bytes) {
        Ok(plain) => {
            let req = Request::from_parts(parts, Body::from(plain));
            next.run(req).await
        }
        Err(e) => {
            tracing::warn!(error = %e, "content decryption failed");
            (StatusCode::BAD_REQUEST, "content decryption failed").into_response()
        }
    }
}

/// Decompresses gzip request bodies and compresses responses for clients
/// that advertise gzip support.
pub async fn gzip(req: Request, next: Next) -> Response {
    let client_accepts_gzip = req
        .headers()
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));
    let compressed_request = req
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));

    let req = if compressed_request {
        let (parts, body) = req.into_parts();
        let Ok(bytes) = to_bytes(body, usize::MAX).await else {
            return (StatusCode::BAD_REQUEST, "can't read body").into_response();
        };

        let mut plain = Vec::new();
        if let Err(e) = GzDecoder::new(&bytes[..]).read_to_end(&mut plain) {
            tracing::warn!(error = %e, "request body decompression failed");
            return (StatusCode::BAD_REQUEST, "malformed gzip body").into_response();
        }

        Request::from_parts(parts, Body::from(plain))
    } else {
        req
    };

    let response = next.run(req).await;
    if !client_accepts_gzip {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let Ok(bytes) = to_bytes(body, usize::MAX).await else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "can't read response body").into_response();
    };

    match compress(&bytes) {
        Ok(compressed) => {
            parts
                .headers
                .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            parts
                .headers
                .insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
            parts.headers.remove(header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(compressed))
        }
        Err(e) => {
            tracing::error!(error = %e, "response compression failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "response compression failed").into_response()
        }
    }
}

/// Verifies the request-body HMAC when the header is present, and signs the
/// response body with the same key. Pass-through when no key is configured.
pub async fn hash_check_and_sign(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(key) = state.key.clone() else {
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get(&HASH_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let req = if provided.is_empty() {
        req
    } else {
        let (parts, body) = req.into_parts();
        let Ok(bytes) = to_bytes(body, usize::MAX).await else {
            return (StatusCode::BAD_REQUEST, "can't read body").into_response();
        };

        if !signature::verify(key.as_bytes(), &bytes, &provided) {
            tracing::warn!("request body hash check failed");
            return (StatusCode::BAD_REQUEST, "wrong hash").into_response();
        }

        Request::from_parts(parts, Body::from(bytes))
    };

    let response = next.run(req).await;

    let (mut parts, body) = response.into_parts();
    let Ok(bytes) = to_bytes(body, usize::MAX).await else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "can't read response body").into_response();
    };

    let sig = signature::sign(key.as_bytes(), &bytes);
    if let Ok(value) = HeaderValue::from_str(&sig) {
        parts.headers.insert(HASH_HEADER.clone(), value);
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn compress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}
