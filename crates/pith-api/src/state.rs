use std::sync::Arc;
use std::time::Instant;

use pith_core::Runtime;

/// Shared state handed to every axum handler via the `State` extractor.
#[derive(Clone)]
pub struct ApiState {
    pub runtime: Arc<Runtime>,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime, started_at: Instant::now() }
    }
}
