// Claim-based authorization for bound routes

pub mod claims;
pub mod jwt;
pub mod permission;

// Re-export core types
pub use claims::*;
pub use jwt::*;
pub use permission::*;
