use std::time::{Duration, Instant};

use axum::http::StatusCode;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::RequestError;
use crate::lifecycle::context::LifecycleContext;
use crate::lifecycle::module::StageHandler;
use crate::lifecycle::stage::Stage;

/// One slot in a compiled chain: a stage and whatever handles it. An empty
/// slot logs and falls through.
pub struct ChainLink {
    pub stage: Stage,
    pub(crate) handler: Option<StageHandler>,
}

/// The terminal result of driving a chain: the final context plus the
/// error, if any, that cut it short. Exactly one outcome per request.
#[derive(Debug)]
pub struct ChainOutcome {
    pub context: LifecycleContext,
    pub error: Option<RequestError>,
}

impl ChainOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A method binding's six stages, compiled once and reused by every
/// request to that (route, verb).
pub struct CompiledChain {
    verb: &'static str,
    route: String,
    links: Vec<ChainLink>,
    stage_timeout: Option<Duration>,
}

impl CompiledChain {
    pub(crate) fn new(
        verb: &'static str,
        route: String,
        links: Vec<ChainLink>,
        stage_timeout: Option<Duration>,
    ) -> Self {
        Self {
            verb,
            route,
            links,
            stage_timeout,
        }
    }

    /// Drive every stage in order and settle the terminal outcome.
    ///
    /// A handler runs only while the response is unsent, except
    /// AfterRespond, which runs after a sent response if and only if this
    /// chain's Respond stage produced it. The first error skips every
    /// remaining handler, AfterRespond included. A chain that completes
    /// without sending anything settles as 405.
    pub async fn execute(&self, mut ctx: LifecycleContext) -> ChainOutcome {
        let started = Instant::now();
        let mut error: Option<RequestError> = None;

        debug!(
            request_id = %ctx.request.request_id,
            "chain starting: {} {}",
            self.verb,
            self.route
        );

        for link in &self.links {
            if error.is_some() {
                break;
            }
            let stage = link.stage;

            if stage == Stage::Respond && !ctx.response.headers_sent() {
                ctx.mark_responded();
            }
            let runnable = !ctx.response.headers_sent()
                || (ctx.responded() && stage == Stage::AfterRespond);
            if !runnable {
                trace!("stage {} skipped - response already sent", stage);
                continue;
            }

            let handler = match &link.handler {
                Some(handler) => handler,
                None => {
                    debug!("no {} handler bound for {} {}", stage, self.verb, self.route);
                    continue;
                }
            };

            ctx.current_stage = Some(stage);
            let stage_started = Instant::now();

            let result = match self.stage_timeout {
                None => handler(ctx).await,
                Some(limit) => {
                    let before_stage = ctx.clone();
                    match timeout(limit, handler(ctx)).await {
                        Ok(result) => result,
                        Err(_elapsed) => Err(before_stage.fail(RequestError::Stage {
                            stage: stage.name(),
                            source: anyhow::anyhow!("timed out after {:?}", limit),
                        })),
                    }
                }
            };

            match result {
                Ok(next) => {
                    trace!(
                        "stage {} completed in {:?}",
                        stage,
                        stage_started.elapsed()
                    );
                    ctx = next;
                }
                Err(failure) => {
                    warn!(
                        request_id = %failure.context.request.request_id,
                        "stage {} failed in {:?}: {}",
                        stage,
                        stage_started.elapsed(),
                        failure.error
                    );
                    ctx = failure.context;
                    error = Some(failure.error);
                }
            }
        }

        self.settle(ctx, error, started)
    }

    /// Terminal step, entered exactly once per request.
    fn settle(
        &self,
        mut ctx: LifecycleContext,
        error: Option<RequestError>,
        started: Instant,
    ) -> ChainOutcome {
        match (error, ctx.response.headers_sent()) {
            (Some(error), _) => {
                debug!(
                    request_id = %ctx.request.request_id,
                    "chain settled with error in {:?}: {}",
                    started.elapsed(),
                    error
                );
                ChainOutcome {
                    context: ctx,
                    error: Some(error),
                }
            }
            (None, false) => {
                warn!(
                    request_id = %ctx.request.request_id,
                    "chain for {} {} completed without responding",
                    self.verb,
                    self.route
                );
                ctx.response.send_status(StatusCode::METHOD_NOT_ALLOWED);
                ChainOutcome {
                    context: ctx,
                    error: Some(RequestError::Incomplete),
                }
            }
            (None, true) => {
                debug!(
                    request_id = %ctx.request.request_id,
                    "chain settled in {:?}",
                    started.elapsed()
                );
                ChainOutcome {
                    context: ctx,
                    error: None,
                }
            }
        }
    }
}
