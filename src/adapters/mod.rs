// Adapters layer: REST clients for the Google services behind the domain ports.

pub mod auth;
pub mod bigquery;
pub mod drive;
pub mod gcs;
pub mod http;
pub mod secret_manager;
