// Six-stage request lifecycle bound to every discovered method file

pub mod binder;
pub mod chain;
pub mod context;
pub mod module;
pub mod stage;

// Re-export core types
pub use binder::*;
pub use chain::*;
pub use context::*;
pub use module::*;
pub use stage::*;
