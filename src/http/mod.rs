//! HTTP transport: retrying download client and remote metadata probes.

mod client;
mod retry;

pub use client::{HttpClient, RemoteMetadata};
pub use retry::NonRetryableError;
