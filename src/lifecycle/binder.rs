use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use futures::FutureExt;
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::{LifecycleConfig, SecurityConfig};
use crate::error::RequestError;
use crate::lifecycle::chain::{ChainLink, ChainOutcome, CompiledChain};
use crate::lifecycle::context::LifecycleContext;
use crate::lifecycle::module::{MethodModule, StageHandler};
use crate::lifecycle::stage::Stage;
use crate::security::{is_authorized, Permission};

/// A discovered method wired to its module and policy, ready to serve
/// requests. The chain compiles on first use, at most once, and every
/// later request reuses it.
pub struct MethodBinding {
    pub verb: &'static str,
    pub route: String,
    pub permission: Permission,
    module: Arc<MethodModule>,
    allow_by_default: bool,
    stage_timeout: Option<Duration>,
    chain: OnceCell<CompiledChain>,
}

impl MethodBinding {
    pub async fn execute(&self, ctx: LifecycleContext) -> ChainOutcome {
        let chain = self.chain.get_or_init(|| self.compile());
        chain.execute(ctx).await
    }

    /// Whether the chain has been compiled yet.
    pub fn compiled(&self) -> bool {
        self.chain.get().is_some()
    }

    fn compile(&self) -> CompiledChain {
        debug!("compiling chain for {} {}", self.verb, self.route);
        let links = Stage::ORDER
            .iter()
            .map(|&stage| {
                let handler = self.module.handler(stage).cloned().or_else(|| {
                    (stage == Stage::Authorize).then(|| {
                        default_authorize(self.permission.clone(), self.allow_by_default)
                    })
                });
                ChainLink { stage, handler }
            })
            .collect();
        CompiledChain::new(
            self.verb,
            self.route.clone(),
            links,
            self.stage_timeout,
        )
    }
}

/// Builds MethodBindings out of discovered methods and their modules.
pub struct MethodBinder {
    allow_by_default: bool,
    stage_timeout: Option<Duration>,
}

impl MethodBinder {
    pub fn new(security: &SecurityConfig, lifecycle: &LifecycleConfig) -> Self {
        Self {
            allow_by_default: security.allow_by_default,
            stage_timeout: lifecycle.stage_timeout(),
        }
    }

    /// Wire one discovered method to its module. The module's own
    /// permission beats the derived template; stages the module does not
    /// handle are logged here once and fall through at execution time.
    pub fn bind(
        &self,
        verb: &'static str,
        route: &str,
        derived_permission: &str,
        module: Arc<MethodModule>,
    ) -> MethodBinding {
        let permission = module
            .supplied_permission()
            .cloned()
            .unwrap_or_else(|| Permission::new(derived_permission));

        for stage in module.missing_stages() {
            if stage == Stage::Authorize {
                debug!(
                    "no authorize handler for {} {}; claim evaluation against '{}' installed",
                    verb, route, permission
                );
            } else {
                warn!("missing lifecycle: no {} handler for {} {}", stage, verb, route);
            }
        }
        info!("bound {} {} ({})", verb.to_uppercase(), route, permission);

        MethodBinding {
            verb,
            route: route.to_string(),
            permission,
            module,
            allow_by_default: self.allow_by_default,
            stage_timeout: self.stage_timeout,
            chain: OnceCell::new(),
        }
    }
}

/// Default Authorize stage: resolve the owner placeholder against the
/// requesting principal, evaluate the claim list first-match-wins, then
/// apply the global evaluation mode. Denial commits a 403.
fn default_authorize(permission: Permission, allow_by_default: bool) -> StageHandler {
    Arc::new(move |ctx: LifecycleContext| {
        let permission = permission.clone();
        async move {
            let permitted = match &ctx.principal {
                Some(principal) => principal.permits(&permission.resolve(&principal.subject)),
                None => false,
            };
            if is_authorized(permitted, allow_by_default) {
                Ok(ctx)
            } else {
                let subject = ctx
                    .principal
                    .as_ref()
                    .map(|p| p.subject.as_str())
                    .unwrap_or("anonymous")
                    .to_string();
                warn!(
                    request_id = %ctx.request.request_id,
                    "authorization denied: '{}' lacks '{}'",
                    subject,
                    permission
                );
                let mut ctx = ctx;
                ctx.response.send_status(StatusCode::FORBIDDEN);
                Err(ctx.fail(RequestError::Forbidden(format!(
                    "'{}' lacks '{}'",
                    subject, permission
                ))))
            }
        }
        .boxed()
    })
}
