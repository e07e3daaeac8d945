use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use clap::Parser;
use serde_json::json;

use trellis::assembler::ServiceContext;
use trellis::config::AppConfig;
use trellis::entity::MemoryLoader;
use trellis::lifecycle::{MethodModule, Stage};
use trellis::registry::ModuleRegistry;
use trellis::security::{issue_token, Principal};
use trellis::server::build_router;

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Serve a resource directory tree as a REST API")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "demos/resources", help = "Resource tree to assemble")]
    root: PathBuf,

    #[arg(long, default_value_t = 3000, help = "Port to listen on")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up TRELLIS_* overrides.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Arc::new(AppConfig::from_env());

    let loader = Arc::new(MemoryLoader::new());
    seed(&loader).await;

    let ctx = ServiceContext {
        config: config.clone(),
        resolver: Arc::new(demo_registry()),
        loader,
    };
    let app = build_router(ctx, &cli.root).await?;

    // A ready-made token so the demo routes can be exercised with curl.
    let demo = Principal::new("456", vec!["*:*:456".to_string(), "alpha".to_string()]);
    match issue_token(&demo, &config.security) {
        Ok(token) => println!("demo bearer token for subject 456:\n{}\n", token),
        Err(e) => tracing::warn!("could not mint demo token: {}", e),
    }

    // Allow deployments to override port via env
    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(cli.port);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    println!(
        "🚀 trellis serving {} on http://{}",
        cli.root.display(),
        bind_addr
    );

    axum::serve(listener, app).await?;
    Ok(())
}

/// Method modules for the files under demos/resources, keyed by their
/// path relative to the tree root.
fn demo_registry() -> ModuleRegistry {
    ModuleRegistry::new()
        .method(
            "alpha/get.toml",
            MethodModule::new().on(Stage::Respond, |mut ctx| async move {
                ctx.response.send_json(
                    StatusCode::OK,
                    json!({"records": [{"id": "1"}, {"id": "2"}]}),
                );
                Ok(ctx)
            }),
        )
        .method(
            "alpha/post.toml",
            MethodModule::new()
                .on(Stage::Validate, |mut ctx| async move {
                    let named = ctx
                        .request
                        .body
                        .as_ref()
                        .and_then(|body| body.get("name"))
                        .is_some();
                    if !named {
                        ctx.response.send_json(
                            StatusCode::BAD_REQUEST,
                            json!({"error": true, "message": "name is required"}),
                        );
                    }
                    Ok(ctx)
                })
                .on(Stage::Respond, |mut ctx| async move {
                    let body = ctx.request.body.clone().unwrap_or_else(|| json!({}));
                    ctx.response
                        .send_json(StatusCode::CREATED, json!({"created": body}));
                    Ok(ctx)
                }),
        )
        .method(
            "alpha/me/get.toml",
            MethodModule::new().on(Stage::Respond, |mut ctx| async move {
                let record = ctx.entity("alpha").cloned().unwrap_or_else(|| json!({}));
                ctx.response
                    .send_json(StatusCode::OK, json!({"record": record}));
                Ok(ctx)
            }),
        )
        .method(
            "alpha/me/put.toml",
            MethodModule::new()
                .on(Stage::Respond, |mut ctx| async move {
                    let id = ctx.param("alpha").unwrap_or_default().to_string();
                    let patch = ctx.request.body.clone().unwrap_or_else(|| json!({}));
                    ctx.response
                        .send_json(StatusCode::OK, json!({"id": id, "updated": patch}));
                    Ok(ctx)
                })
                .on(Stage::AfterRespond, |ctx| async move {
                    tracing::info!("alpha {:?} updated", ctx.param("alpha"));
                    Ok(ctx)
                }),
        )
        .method(
            "alpha/me/gama/put.toml",
            MethodModule::new().on(Stage::Respond, |mut ctx| async move {
                let id = ctx.param("alpha").unwrap_or_default().to_string();
                ctx.response
                    .send_json(StatusCode::OK, json!({"gama": "updated", "alpha": id}));
                Ok(ctx)
            }),
        )
        .method(
            "beta/me/get.toml",
            MethodModule::new().on(Stage::Respond, |mut ctx| async move {
                let id = ctx.param("beta").unwrap_or_default().to_string();
                ctx.response.send_json(StatusCode::OK, json!({"beta": id}));
                Ok(ctx)
            }),
        )
}

async fn seed(loader: &MemoryLoader) {
    loader
        .insert("alpha", "1", json!({"id": "1", "name": "first"}))
        .await;
    loader
        .insert("alpha", "2", json!({"id": "2", "name": "second"}))
        .await;
}
