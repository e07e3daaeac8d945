use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use axum::extract::Path as PathParams;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use axum::{Extension, Json, Router};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::assembler::{Assembler, RouteRegistrar, ServiceContext};
use crate::config::SecurityConfig;
use crate::entity::EntityBinding;
use crate::error::{AssembleError, RequestError};
use crate::lifecycle::{LifecycleContext, MethodBinding, RequestEnvelope};
use crate::security::{principal_middleware, Principal};

/// Route table built up during assembly, convertible into an axum Router.
#[derive(Default)]
pub struct RouterPlan {
    methods: Vec<Arc<MethodBinding>>,
    entities: Vec<EntityBinding>,
}

impl RouteRegistrar for RouterPlan {
    fn register_method(&mut self, binding: MethodBinding) {
        self.methods.push(Arc::new(binding));
    }

    fn register_entity(&mut self, binding: EntityBinding) {
        self.entities.push(binding);
    }
}

impl RouterPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound endpoints as (verb, route, permission) triples, in
    /// registration order.
    pub fn endpoints(&self) -> Vec<(&'static str, String, String)> {
        self.methods
            .iter()
            .map(|m| (m.verb, m.route.clone(), m.permission.to_string()))
            .collect()
    }

    /// Finish the plan: one axum route per bound endpoint, the principal
    /// extractor wrapped around all of them, CORS and request tracing on
    /// the outside.
    pub fn into_router(self, security: Arc<SecurityConfig>) -> Router {
        let mut entities = self.entities;
        // Loaders run in parameter order, independent of discovery order.
        entities.sort_by(|a, b| a.param.cmp(&b.param));
        let entities = Arc::new(entities);

        let mut groups: BTreeMap<String, MethodRouter> = BTreeMap::new();
        for binding in self.methods {
            let filter = match method_filter(binding.verb) {
                Some(filter) => filter,
                None => {
                    warn!(
                        "cannot register {} {}: verb not routable here",
                        binding.verb, binding.route
                    );
                    continue;
                }
            };
            let route = binding.route.clone();
            let handler = {
                let binding = binding.clone();
                let entities = entities.clone();
                move |uri: Uri,
                      PathParams(params): PathParams<HashMap<String, String>>,
                      headers: HeaderMap,
                      principal: Option<Extension<Principal>>,
                      body: Option<Json<Value>>| {
                    let binding = binding.clone();
                    let entities = entities.clone();
                    async move {
                        let principal = principal.map(|Extension(p)| p);
                        let body = body.map(|Json(v)| v);
                        drive(binding, entities, uri, params, headers, principal, body).await
                    }
                }
            };
            let method_router = groups.remove(&route).unwrap_or_default();
            groups.insert(route, method_router.on(filter, handler));
        }

        let mut router = Router::new();
        for (route, method_router) in groups {
            router = router.route(&route, method_router);
        }
        router
            .layer(middleware::from_fn_with_state(
                security,
                principal_middleware,
            ))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }
}

/// One request against one binding: load entities for the route's
/// parameters, drive the chain, render the single terminal outcome.
async fn drive(
    binding: Arc<MethodBinding>,
    entities: Arc<Vec<EntityBinding>>,
    uri: Uri,
    params: HashMap<String, String>,
    headers: HeaderMap,
    principal: Option<Principal>,
    body: Option<Value>,
) -> Response {
    let mut envelope = RequestEnvelope::new(binding.verb, uri.path());
    envelope.headers = headers;
    envelope.body = body;
    let mut ctx = LifecycleContext::new(envelope)
        .with_principal(principal)
        .with_params(params);

    debug!(
        request_id = %ctx.request.request_id,
        "dispatching {} {}",
        binding.verb,
        uri.path()
    );

    for entity in entities.iter() {
        if !ctx.params.contains_key(&entity.param) {
            continue;
        }
        if let Err(error) = entity.load_into(&mut ctx).await {
            return render(ctx, Some(error));
        }
    }

    let outcome = binding.execute(ctx).await;
    render(outcome.context, outcome.error)
}

/// Convert the terminal outcome into the one HTTP response. Whatever the
/// lifecycle committed wins; an error that committed nothing renders from
/// its fixed status mapping.
fn render(ctx: LifecycleContext, error: Option<RequestError>) -> Response {
    match (ctx.response.status(), error) {
        (Some(status), error) => match ctx.response.body() {
            Some(body) => (status, Json(body.clone())).into_response(),
            None => match error {
                Some(error) => (status, Json(error.to_json())).into_response(),
                None => status.into_response(),
            },
        },
        (None, Some(error)) => error.into_response(),
        // The chain settles every request with a committed status or an
        // error; nothing reaches here with neither.
        (None, None) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn method_filter(verb: &str) -> Option<MethodFilter> {
    match verb {
        "get" => Some(MethodFilter::GET),
        "post" => Some(MethodFilter::POST),
        "put" => Some(MethodFilter::PUT),
        "delete" => Some(MethodFilter::DELETE),
        "patch" => Some(MethodFilter::PATCH),
        "head" => Some(MethodFilter::HEAD),
        "options" => Some(MethodFilter::OPTIONS),
        "trace" => Some(MethodFilter::TRACE),
        _ => None,
    }
}

/// Assemble `root` and finish straight into a servable Router.
pub async fn build_router(ctx: ServiceContext, root: &Path) -> Result<Router, AssembleError> {
    let mut plan = RouterPlan::new();
    Assembler::new(ctx.clone()).assemble(root, &mut plan).await?;
    for (verb, route, permission) in plan.endpoints() {
        debug!("serving {} {} ({})", verb.to_uppercase(), route, permission);
    }
    Ok(plan.into_router(Arc::new(ctx.config.security.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_is_not_routable() {
        assert!(method_filter("connect").is_none());
        for verb in ["get", "post", "put", "delete", "patch", "head", "options", "trace"] {
            assert!(method_filter(verb).is_some(), "{} should route", verb);
        }
    }
}
