//! Bearer-token gate
//!
//! The `Authorization` header must equal the configured token. Both sides are
//! hashed with SHA-256 and the digests compared without early exit.

use std::fmt;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::server::state::AppState;

/// The configured API token, held only as a digest
#[derive(Clone)]
pub struct AuthToken {
    digest: [u8; 32],
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

impl AuthToken {
    /// `None` for an empty token
    pub fn new(token: &str) -> Option<Self> {
        if token.is_empty() {
            return None;
        }
        Some(Self {
            digest: Sha256::digest(token.as_bytes()).into(),
        })
    }

    pub fn verify(&self, presented: &str) -> bool {
        if presented.is_empty() {
            return false;
        }
        let presented: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
        presented
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Middleware rejecting requests without the configured token
pub async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Result<Response> {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !state.auth.verify(presented) {
        return Err(Error::Unauthorized);
    }
    Ok(next.run(request).await)
}
