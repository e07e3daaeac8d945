use std::collections::HashMap;
use std::time::Instant;

use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;
use uuid::Uuid;

use crate::error::RequestError;
use crate::lifecycle::stage::Stage;
use crate::security::Principal;

/// The incoming request as the lifecycle sees it.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    /// Correlation id, minted per request.
    pub request_id: Uuid,
    pub verb: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl RequestEnvelope {
    pub fn new(verb: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            verb: verb.into(),
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Request header by name, when it carried valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Write-once response accumulator. The first status write wins; later
/// writes are refused and reported to the caller, never silently merged.
#[derive(Debug, Clone, Default)]
pub struct ResponseState {
    status: Option<StatusCode>,
    body: Option<Value>,
}

impl ResponseState {
    /// Whether a status has been committed, the analogue of a server's
    /// headers-sent flag.
    pub fn headers_sent(&self) -> bool {
        self.status.is_some()
    }

    /// Commit a bare status. Returns false when a response was already
    /// committed, leaving the earlier one untouched.
    pub fn send_status(&mut self, status: StatusCode) -> bool {
        if self.headers_sent() {
            return false;
        }
        self.status = Some(status);
        true
    }

    /// Commit a status plus JSON body. Same write-once rule.
    pub fn send_json(&mut self, status: StatusCode, body: Value) -> bool {
        if self.headers_sent() {
            return false;
        }
        self.status = Some(status);
        self.body = Some(body);
        true
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }
}

/// Per-request state that flows through the lifecycle chain. Handlers take
/// it by value and hand it back, modified or wrapped in a failure.
#[derive(Debug, Clone)]
pub struct LifecycleContext {
    // Core request data
    pub request: RequestEnvelope,
    pub response: ResponseState,

    // Route parameters and the entities loaded for them
    pub params: HashMap<String, String>,
    pub entities: HashMap<String, Value>,

    // Authenticated requester, when one arrived
    pub principal: Option<Principal>,

    // Chain progress
    pub current_stage: Option<Stage>,
    pub start_time: Instant,
    responded: bool,
}

impl LifecycleContext {
    pub fn new(request: RequestEnvelope) -> Self {
        Self {
            request,
            response: ResponseState::default(),
            params: HashMap::new(),
            entities: HashMap::new(),
            principal: None,
            current_stage: None,
            start_time: Instant::now(),
            responded: false,
        }
    }

    pub fn with_principal(mut self, principal: Option<Principal>) -> Self {
        self.principal = principal;
        self
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    /// One-way flag: set when the chain reaches Respond with the response
    /// still unsent. Never resets for the rest of the request.
    pub fn responded(&self) -> bool {
        self.responded
    }

    pub(crate) fn mark_responded(&mut self) {
        self.responded = true;
    }

    /// Route parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Entity loaded for a route parameter.
    pub fn entity(&self, name: &str) -> Option<&Value> {
        self.entities.get(name)
    }

    /// Wrap this context in a stage failure, keeping any response state
    /// the stage wrote before giving up.
    pub fn fail(self, error: RequestError) -> StageFailure {
        StageFailure {
            context: self,
            error,
        }
    }
}

/// A failed stage: the error plus the context as the stage left it.
#[derive(Debug)]
pub struct StageFailure {
    pub context: LifecycleContext,
    pub error: RequestError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_response_write_wins() {
        let mut response = ResponseState::default();
        assert!(!response.headers_sent());

        assert!(response.send_json(StatusCode::OK, json!({"ok": true})));
        assert!(response.headers_sent());

        assert!(!response.send_status(StatusCode::FORBIDDEN));
        assert!(!response.send_json(StatusCode::NOT_FOUND, json!({})));
        assert_eq!(response.status(), Some(StatusCode::OK));
        assert_eq!(response.body(), Some(&json!({"ok": true})));
    }

    #[test]
    fn test_responded_flag_is_one_way() {
        let mut ctx = LifecycleContext::new(RequestEnvelope::new("get", "/alpha/5"));
        assert!(!ctx.responded());
        ctx.mark_responded();
        assert!(ctx.responded());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestEnvelope::new("get", "/");
        let b = RequestEnvelope::new("get", "/");
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_header_lookup() {
        let mut envelope = RequestEnvelope::new("get", "/");
        envelope.headers.insert("x-note", "keep".parse().unwrap());
        assert_eq!(envelope.header("x-note"), Some("keep"));
        assert_eq!(envelope.header("missing"), None);
    }

    #[test]
    fn test_failure_keeps_written_state() {
        let mut ctx = LifecycleContext::new(RequestEnvelope::new("get", "/alpha/5"));
        ctx.response.send_status(StatusCode::FORBIDDEN);
        let failure = ctx.fail(RequestError::Forbidden("denied".into()));
        assert_eq!(failure.context.response.status(), Some(StatusCode::FORBIDDEN));
    }
}
