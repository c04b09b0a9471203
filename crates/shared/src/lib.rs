//! Shared types, errors, and configuration for Hirebill.
//!
//! This crate provides common types used across all other crates:
//! - Money helpers with decimal precision
//! - Typed identifiers for vendor-assigned IDs
//! - Field-alias resolution for inconsistently named vendor JSON
//! - Application-wide error types
//! - Configuration management
//! - Admin session tokens

pub mod alias;
pub mod auth;
pub mod config;
pub mod error;
pub mod jwt;
pub mod types;

pub use alias::FieldAliases;
pub use auth::Claims;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use jwt::{SessionConfig, SessionTokenError, SessionTokenService};
