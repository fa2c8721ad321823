//! Typed client for the EASM backend: one `ApiClient` wrapping a
//! reqwest client, per-request connection resolution, and failure
//! normalization into a single display message.

mod client;
pub mod models;

pub use client::{ApiClient, ApiError, DEFAULT_TIMEOUT};
