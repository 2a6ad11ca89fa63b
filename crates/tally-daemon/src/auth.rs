//! Bearer API key check for admin routes.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::http::ApiError;

/// Digest of the configured admin key.
#[derive(Clone, Debug)]
pub struct ApiKeyConfig {
    /// `None` when no key is configured; every admin request is refused.
    expected: Option<[u8; 32]>,
}

impl ApiKeyConfig {
    pub fn new(api_key: &str) -> Self {
        let key = api_key.trim();
        Self {
            expected: (!key.is_empty()).then(|| *blake3::hash(key.as_bytes()).as_bytes()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.expected.is_some()
    }

    /// Compare a supplied key in constant time.
    pub fn verify(&self, supplied: &str) -> bool {
        let Some(expected) = self.expected else {
            return false;
        };
        let supplied = blake3::hash(supplied.as_bytes());
        constant_time_eq(&expected, supplied.as_bytes())
    }
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

pub async fn require_api_key(State(config): State<ApiKeyConfig>, req: Request, next: Next) -> Response {
    if bearer_token(&req).is_some_and(|token| config.verify(token)) {
        return next.run(req).await;
    }
    // Missing and incorrect keys are indistinguishable.
    ApiError::unauthorized().into_response()
}
