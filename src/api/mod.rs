//! Study API client and the types it exchanges.

pub mod api_types;
pub mod backend;
pub mod client;
#[cfg(test)]
pub mod mock;
pub mod types;

pub use backend::Backend;
pub use client::HttpBackend;
