use std::sync::Arc;
use weather_core::Resolver;

/// Server state shared across handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub resolver: Arc<Resolver>,
}

impl AppState {
    pub fn new(resolver: Resolver) -> Self {
        Self { resolver: Arc::new(resolver) }
    }
}
