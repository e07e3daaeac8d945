use std::path::{Component, Path};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::entity::{EntityBinder, EntityBinding, EntityLoader, EntityModule};
use crate::error::AssembleError;
use crate::lifecycle::{MethodBinder, MethodBinding, MethodModule};
use crate::registry::ModuleResolver;
use crate::route::{ResourceKind, ResourceScanner};

/// Everything assembly needs, passed explicitly. No ambient singletons;
/// two assemblers with different contexts can coexist in one process.
#[derive(Clone)]
pub struct ServiceContext {
    pub config: Arc<AppConfig>,
    pub resolver: Arc<dyn ModuleResolver>,
    pub loader: Arc<dyn EntityLoader>,
}

/// Where bound routes land. The axum adapter implements this; tests use a
/// recording registrar.
pub trait RouteRegistrar {
    fn register_method(&mut self, binding: MethodBinding);
    fn register_entity(&mut self, binding: EntityBinding);
}

/// Orchestrates the one scan-and-bind pass that turns a resource tree
/// into registered routes. Runs at startup; after it returns, the
/// registrar holds the complete, immutable route table.
pub struct Assembler {
    ctx: ServiceContext,
}

impl Assembler {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Scan `root` once and bind every discovered record. Scan errors and
    /// bind failures abort assembly; a service with a partial route table
    /// must not come up.
    pub async fn assemble(
        &self,
        root: &Path,
        registrar: &mut dyn RouteRegistrar,
    ) -> Result<(), AssembleError> {
        let config = &self.ctx.config;
        config.validate()?;

        let scanner = ResourceScanner::new(&config.scan)?;
        let outcome = scanner.scan(root);
        if !outcome.errors.is_empty() {
            return Err(AssembleError::Scan(outcome.errors));
        }

        let method_binder = MethodBinder::new(&config.security, &config.lifecycle);
        let entity_binder = EntityBinder::new(self.ctx.loader.clone());

        let mut methods = 0usize;
        let mut entities = 0usize;
        let mut unhandled = 0usize;

        for record in outcome.records {
            let key = relative_key(root, &record.path);
            match record.kind {
                ResourceKind::Method {
                    verb,
                    route,
                    permission,
                } => {
                    let module = self.ctx.resolver.method_module(&key).unwrap_or_else(|| {
                        warn!(
                            "no module registered for method file '{}'; binding an empty module",
                            key
                        );
                        Arc::new(MethodModule::new())
                    });
                    registrar.register_method(method_binder.bind(
                        verb,
                        &route,
                        &permission,
                        module,
                    ));
                    methods += 1;
                }
                ResourceKind::Entity { name } => {
                    let module = self
                        .ctx
                        .resolver
                        .entity_module(&name)
                        .unwrap_or_else(|| {
                            debug!("no module registered for entity '{}'; loader-only binding", name);
                            Arc::new(EntityModule::new())
                        });
                    registrar.register_entity(entity_binder.bind(&name, &module).await?);
                    entities += 1;
                }
                ResourceKind::Unhandled => {
                    debug!("unhandled resource file '{}'", key);
                    unhandled += 1;
                }
            }
        }

        info!(
            "assembly complete: {} methods, {} entities, {} unhandled files",
            methods, entities, unhandled
        );
        Ok(())
    }
}

/// Root-relative path with `/` separators, the method module lookup key.
fn relative_key(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(os) => Some(os.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
