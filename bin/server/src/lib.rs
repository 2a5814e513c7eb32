//! medislot HTTP server.
//!
//! Serves role resolution and access decisions to the scheduling frontend.
//! Identity comes from the OIDC provider; roles come from the local user
//! table and are resolved fresh on every request.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod security;
pub mod state;
