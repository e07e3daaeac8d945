//! Convention-over-configuration resource routing: point the assembler at
//! a directory tree and get back a wired axum Router. Directories become
//! route segments, method files become endpoints, `me` directories become
//! path parameters, and every endpoint runs a six-stage request lifecycle
//! with claim-based authorization.

pub mod assembler;
pub mod config;
pub mod entity;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod route;
pub mod security;
pub mod server;
