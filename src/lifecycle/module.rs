use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::lifecycle::context::{LifecycleContext, StageFailure};
use crate::lifecycle::stage::Stage;
use crate::security::Permission;

/// What a stage handler hands back: the context, or a failure carrying it.
pub type StageResult = Result<LifecycleContext, StageFailure>;

/// Boxed async stage handler. One calling convention for every stage.
pub type StageHandler = Arc<dyn Fn(LifecycleContext) -> BoxFuture<'static, StageResult> + Send + Sync>;

/// Handler set a resource author supplies for one method file. Stages are
/// optional; whatever is absent gets a pass-through at bind time. The
/// module may also pin its own permission template, which beats the
/// derived one.
#[derive(Default, Clone)]
pub struct MethodModule {
    handlers: HashMap<Stage, StageHandler>,
    permission: Option<Permission>,
}

impl MethodModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a handler for one stage. Last write per stage wins.
    pub fn on<F, Fut>(mut self, stage: Stage, handler: F) -> Self
    where
        F: Fn(LifecycleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StageResult> + Send + 'static,
    {
        self.handlers
            .insert(stage, Arc::new(move |ctx| handler(ctx).boxed()));
        self
    }

    /// Pin the permission template instead of using the derived one.
    pub fn permission(mut self, permission: impl Into<Permission>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    pub fn handler(&self, stage: Stage) -> Option<&StageHandler> {
        self.handlers.get(&stage)
    }

    pub fn has(&self, stage: Stage) -> bool {
        self.handlers.contains_key(&stage)
    }

    pub fn supplied_permission(&self) -> Option<&Permission> {
        self.permission.as_ref()
    }

    /// Stages this module does not handle, in chain order.
    pub fn missing_stages(&self) -> Vec<Stage> {
        Stage::ORDER
            .iter()
            .copied()
            .filter(|stage| !self.has(*stage))
            .collect()
    }
}

impl fmt::Debug for MethodModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages: Vec<&'static str> = Stage::ORDER
            .iter()
            .filter(|stage| self.has(**stage))
            .map(|stage| stage.name())
            .collect();
        f.debug_struct("MethodModule")
            .field("stages", &stages)
            .field("permission", &self.permission)
            .finish()
    }
}
