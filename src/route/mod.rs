// Route derivation from filesystem conventions

pub mod path;
pub mod scanner;

// Re-export core types
pub use path::*;
pub use scanner::*;
