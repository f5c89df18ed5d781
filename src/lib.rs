//! Library crate for wiki-race-back, exposing modules for binaries and integration tests.

/// Client-side polling protocol.
pub mod client;
/// Runtime configuration.
pub mod config;
/// Persistence layer.
pub mod dao;
/// HTTP payloads.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// Axum routes.
pub mod routes;
/// Business logic.
pub mod services;
/// Shared application state and domain types.
pub mod state;
