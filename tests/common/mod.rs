#![allow(dead_code)]

use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use trellis::assembler::{Assembler, RouteRegistrar, ServiceContext};
use trellis::config::AppConfig;
use trellis::entity::{EntityBinding, EntityLoader, MemoryLoader};
use trellis::lifecycle::{MethodBinding, MethodModule, Stage};
use trellis::registry::ModuleRegistry;
use trellis::security::{issue_token, Principal};
use trellis::server::RouterPlan;

static TRACING: OnceLock<()> = OnceLock::new();

pub fn init_tracing() {
    TRACING.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// The canonical resource tree used across the integration tests:
/// collection routes, marker parameters at two depths, an entity file,
/// one file no convention claims, and a dot-directory that must be
/// ignored.
pub fn fixture_tree() -> Result<TempDir> {
    let dir = tempfile::tempdir()?;
    for file in [
        "alpha/alpha-entity.toml",
        "alpha/get.toml",
        "alpha/post.toml",
        "alpha/me/get.toml",
        "alpha/me/post.toml",
        "alpha/me/beta/me/gama/put.toml",
        "alpha/me/sample/get.toml",
        "beta/me/sample/delete.toml",
        "notes.txt",
        ".hidden/get.toml",
    ] {
        touch(dir.path(), file)?;
    }
    Ok(dir)
}

pub fn touch(root: &Path, rel: &str) -> Result<()> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, b"")?;
    Ok(())
}

/// Registrar that only records what assembly produced, for asserting on
/// discovered routes without standing up a router.
#[derive(Default)]
pub struct RecordingRegistrar {
    pub methods: Vec<MethodBinding>,
    pub entities: Vec<EntityBinding>,
}

impl fmt::Debug for RecordingRegistrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingRegistrar")
            .field("methods", &self.endpoints())
            .field("entities", &self.entities.len())
            .finish()
    }
}

impl RouteRegistrar for RecordingRegistrar {
    fn register_method(&mut self, binding: MethodBinding) {
        self.methods.push(binding);
    }

    fn register_entity(&mut self, binding: EntityBinding) {
        self.entities.push(binding);
    }
}

impl RecordingRegistrar {
    /// (verb, route, permission) triples in registration order.
    pub fn endpoints(&self) -> Vec<(String, String, String)> {
        self.methods
            .iter()
            .map(|m| {
                (
                    m.verb.to_string(),
                    m.route.clone(),
                    m.permission.to_string(),
                )
            })
            .collect()
    }
}

pub fn service_context(
    config: AppConfig,
    registry: ModuleRegistry,
    loader: Arc<dyn EntityLoader>,
) -> ServiceContext {
    ServiceContext {
        config: Arc::new(config),
        resolver: Arc::new(registry),
        loader,
    }
}

/// Assemble `root` into a recording registrar.
pub async fn assemble_recording(
    root: &Path,
    config: AppConfig,
    registry: ModuleRegistry,
) -> Result<RecordingRegistrar> {
    init_tracing();
    let ctx = service_context(config, registry, Arc::new(MemoryLoader::new()));
    let mut recording = RecordingRegistrar::default();
    Assembler::new(ctx).assemble(root, &mut recording).await?;
    Ok(recording)
}

/// Assemble `root` all the way into a servable Router.
pub async fn assemble_app(
    root: &Path,
    config: AppConfig,
    registry: ModuleRegistry,
    loader: Arc<dyn EntityLoader>,
) -> Result<Router> {
    init_tracing();
    let security = Arc::new(config.security.clone());
    let ctx = service_context(config, registry, loader);
    let mut plan = RouterPlan::new();
    Assembler::new(ctx).assemble(root, &mut plan).await?;
    Ok(plan.into_router(security))
}

/// Drive one request through the router in process and decode the JSON
/// body (Null when the response carried none).
pub async fn call(
    app: &Router,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

/// Mint a bearer token for a subject with the given claim strings.
pub fn bearer(subject: &str, claims: &[&str], config: &AppConfig) -> String {
    let principal = Principal::new(subject, claims.iter().map(|c| c.to_string()).collect());
    issue_token(&principal, &config.security).expect("token mint")
}

/// A module whose Respond stage sends a fixed status and body.
pub fn respond_with(status: StatusCode, body: Value) -> MethodModule {
    MethodModule::new().on(Stage::Respond, move |mut ctx| {
        let body = body.clone();
        async move {
            ctx.response.send_json(status, body);
            Ok(ctx)
        }
    })
}
