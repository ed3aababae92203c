//! services/api/src/lib.rs
//!
//! HTTP service for the tutoring booking engine: configuration, the PostgreSQL
//! and notification adapters, and the axum router.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
