//! Authorization gate in front of the provisioning routes.
//!
//! Token validation itself is someone else's job; the boundary only asks a
//! yes/no question per request and answers 401 on "no" without ever reaching
//! the orchestrator.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::error::ApiError;

/// One authorization decision per request.
pub trait AuthorizationGate: Send + Sync {
    /// `bearer` is the token of an `Authorization: Bearer` header, if any.
    fn is_authorized(&self, bearer: Option<&str>) -> bool;
}

/// Lets every request through.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenGate;

impl AuthorizationGate for OpenGate {
    fn is_authorized(&self, _bearer: Option<&str>) -> bool { true }
}

/// Accepts exactly one shared bearer token.
#[derive(Clone)]
pub struct StaticTokenGate {
    token: String,
}

impl StaticTokenGate {
    pub fn new(token: impl Into<String>) -> Self { Self { token: token.into() } }
}

impl std::fmt::Debug for StaticTokenGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenGate").field("token", &"<redacted>").finish()
    }
}

impl AuthorizationGate for StaticTokenGate {
    fn is_authorized(&self, bearer: Option<&str>) -> bool {
        match bearer {
            Some(presented) => {
                let (a, b) = (presented.as_bytes(), self.token.as_bytes());
                a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
            }
            None => false,
        }
    }
}

pub(crate) fn bearer_token(req: &Request) -> Option<&str> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim()).filter(|t| !t.is_empty())
}

/// Route layer: runs the gate, short-circuits with 401 on refusal.
pub async fn require_authorized(
    State(gate): State<Arc<dyn AuthorizationGate>>,
    req: Request,
    next: Next,
) -> Response {
    let allowed = gate.is_authorized(bearer_token(&req));
    if !allowed {
        debug!(path = %req.uri().path(), "api: request refused by gate");
        return ApiError::Unauthorized.into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn req_with(header: Option<&str>) -> Request {
        let mut b = axum::http::Request::builder().uri("/api/v1/list");
        if let Some(h) = header {
            b = b.header(AUTHORIZATION, h);
        }
        b.body(Body::empty()).unwrap()
    }

    #[test]
    fn bearer_is_extracted_case_insensitively() {
        assert_eq!(bearer_token(&req_with(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&req_with(Some("bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&req_with(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&req_with(Some("Bearer "))), None);
        assert_eq!(bearer_token(&req_with(None)), None);
    }

    #[test]
    fn static_gate_compares_whole_token() {
        let gate = StaticTokenGate::new("s3cret");
        assert!(gate.is_authorized(Some("s3cret")));
        assert!(!gate.is_authorized(Some("s3cre")));
        assert!(!gate.is_authorized(Some("s3cret!")));
        assert!(!gate.is_authorized(None));
        assert!(OpenGate.is_authorized(None));
    }
}
