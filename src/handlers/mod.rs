//! HTTP request handlers
//!
//! This module organizes all API handlers into logical groups:
//! - `api` - Multi-call endpoint, health check and metrics
//! - `access` - Method blacklist management
//! - `plugins` - Resolved plugin-point introspection

pub mod access;
pub mod api;
pub mod plugins;

pub use api::{health_check, multi_call_get, multi_call_post};
