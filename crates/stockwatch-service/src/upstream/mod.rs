//! Upstream catalog API access.

use std::sync::Arc;

use async_trait::async_trait;

use stockwatch_core::product::ProductSnapshot;
use stockwatch_core::types::Region;

use crate::error::UpstreamError;

pub mod client;
pub mod token;
pub mod types;

pub use client::HttpConnector;

/// Opens authenticated upstream sessions.
#[async_trait]
pub trait CatalogConnector: Send + Sync {
    /// Opens a session bound to the store that serves `pincode`.
    ///
    /// ## Errors
    /// `UnknownPincode` when no store serves the pincode, otherwise transport
    /// or decode failures.
    async fn connect(&self, pincode: &str) -> Result<Arc<dyn CatalogSession>, UpstreamError>;
}

/// One authenticated connection bound to a region.
#[async_trait]
pub trait CatalogSession: Send + Sync {
    fn region(&self) -> &Region;
    fn pincode(&self) -> &str;

    /// Fetches the full tracked catalog for the session's region.
    async fn fetch_products(&self) -> Result<Vec<ProductSnapshot>, UpstreamError>;
}
