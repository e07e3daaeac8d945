use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{BindError, RequestError};
use crate::lifecycle::LifecycleContext;

/// Persistence seam: given an entity name and a raw route-parameter id,
/// produce the entity, a definite miss, or a failure. Implementations live
/// outside this crate; the in-memory one below serves the demo and tests.
#[async_trait]
pub trait EntityLoader: Send + Sync {
    async fn load(&self, entity: &str, id: &str) -> anyhow::Result<Option<Value>>;
}

/// Everything an entity module's setup handler gets to work with.
pub struct EntityBindContext {
    pub param: String,
    pub loader: Arc<dyn EntityLoader>,
}

type SetupHandler = Arc<dyn Fn(EntityBindContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Optional per-entity startup hook supplied by a resource author. Binding
/// waits for it to finish before the entity's loader goes live; a failure
/// aborts assembly.
#[derive(Default, Clone)]
pub struct EntityModule {
    setup: Option<SetupHandler>,
}

impl EntityModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_setup<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(EntityBindContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.setup = Some(Arc::new(move |bind| handler(bind).boxed()));
        self
    }

    pub fn has_setup(&self) -> bool {
        self.setup.is_some()
    }
}

impl fmt::Debug for EntityModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityModule")
            .field("has_setup", &self.has_setup())
            .finish()
    }
}

/// A live param-to-entity loader, registered for one route parameter.
#[derive(Clone)]
pub struct EntityBinding {
    pub param: String,
    loader: Arc<dyn EntityLoader>,
}

impl EntityBinding {
    /// Resolve this binding's route parameter into a loaded entity on the
    /// context. A request whose route lacks the parameter passes through
    /// untouched; a miss commits 404 and a loader failure commits 500,
    /// each with exactly one outcome.
    pub async fn load_into(&self, ctx: &mut LifecycleContext) -> Result<(), RequestError> {
        let id = match ctx.param(&self.param) {
            Some(id) => id.to_string(),
            None => return Ok(()),
        };

        match self.loader.load(&self.param, &id).await {
            Ok(Some(entity)) => {
                debug!(
                    request_id = %ctx.request.request_id,
                    "loaded entity '{}' for id '{}'",
                    self.param,
                    id
                );
                ctx.entities.insert(self.param.clone(), entity);
                Ok(())
            }
            Ok(None) => {
                ctx.response.send_status(StatusCode::NOT_FOUND);
                Err(RequestError::NotFound(format!("{} '{}'", self.param, id)))
            }
            Err(source) => {
                ctx.response.send_status(StatusCode::INTERNAL_SERVER_ERROR);
                Err(RequestError::LoadFailure {
                    param: self.param.clone(),
                    source,
                })
            }
        }
    }
}

impl fmt::Debug for EntityBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityBinding")
            .field("param", &self.param)
            .finish()
    }
}

/// Builds EntityBindings, running each module's setup to completion first.
pub struct EntityBinder {
    loader: Arc<dyn EntityLoader>,
}

impl EntityBinder {
    pub fn new(loader: Arc<dyn EntityLoader>) -> Self {
        Self { loader }
    }

    pub async fn bind(
        &self,
        param: &str,
        module: &EntityModule,
    ) -> Result<EntityBinding, BindError> {
        if let Some(setup) = &module.setup {
            setup(EntityBindContext {
                param: param.to_string(),
                loader: self.loader.clone(),
            })
            .await
            .map_err(|source| BindError::EntitySetup {
                param: param.to_string(),
                source,
            })?;
        }
        info!("bound entity loader for ':{}'", param);
        Ok(EntityBinding {
            param: param.to_string(),
            loader: self.loader.clone(),
        })
    }
}

/// Table-per-entity in-memory loader for the demo binary and tests.
#[derive(Default, Clone)]
pub struct MemoryLoader {
    tables: Arc<RwLock<HashMap<String, HashMap<String, Value>>>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, entity: &str, id: &str, value: Value) {
        let mut tables = self.tables.write().await;
        tables
            .entry(entity.to_string())
            .or_default()
            .insert(id.to_string(), value);
    }
}

#[async_trait]
impl EntityLoader for MemoryLoader {
    async fn load(&self, entity: &str, id: &str) -> anyhow::Result<Option<Value>> {
        let tables = self.tables.read().await;
        Ok(tables.get(entity).and_then(|rows| rows.get(id)).cloned())
    }
}
