use std::collections::HashMap;
use std::sync::Arc;

use crate::entity::EntityModule;
use crate::lifecycle::MethodModule;

/// Resolves discovered resource files to the modules implementing them.
/// Method modules are looked up by root-relative file path, entity modules
/// by entity name. A miss is not an error; assembly decides what a missing
/// module means.
pub trait ModuleResolver: Send + Sync {
    fn method_module(&self, key: &str) -> Option<Arc<MethodModule>>;
    fn entity_module(&self, name: &str) -> Option<Arc<EntityModule>>;
}

/// Explicit module table, the default resolver. Keys for method modules
/// are root-relative paths with `/` separators, e.g. `alpha/me/post.toml`.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    methods: HashMap<String, Arc<MethodModule>>,
    entities: HashMap<String, Arc<EntityModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, key: impl Into<String>, module: MethodModule) -> Self {
        self.methods.insert(key.into(), Arc::new(module));
        self
    }

    pub fn entity(mut self, name: impl Into<String>, module: EntityModule) -> Self {
        self.entities.insert(name.into(), Arc::new(module));
        self
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

impl ModuleResolver for ModuleRegistry {
    fn method_module(&self, key: &str) -> Option<Arc<MethodModule>> {
        self.methods.get(key).cloned()
    }

    fn entity_module(&self, name: &str) -> Option<Arc<EntityModule>> {
        self.entities.get(name).cloned()
    }
}
