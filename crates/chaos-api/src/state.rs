//! Shared application state for the HTTP layer.

use chaos_core::Backend;
use chaos_core::config::PaginationConfig;

/// Everything a handler needs: the workflow services and list limits.
#[derive(Clone)]
pub struct AppState {
    /// The wired workflow services.
    pub backend: Backend,
    /// Default and maximum page sizes for list endpoints.
    pub pagination: PaginationConfig,
}

impl AppState {
    /// Bundle the backend with its pagination limits.
    pub const fn new(backend: Backend, pagination: PaginationConfig) -> Self {
        Self {
            backend,
            pagination,
        }
    }
}
