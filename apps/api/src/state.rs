use std::sync::Arc;

use crate::compiler::DocumentCompiler;
use crate::optimizer::Optimizer;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Convergence loop; holds the generator, compiler and system prompt.
    pub optimizer: Arc<Optimizer>,
    /// Same compiler the optimizer uses, for `/api/compile` and health probes.
    pub compiler: Arc<dyn DocumentCompiler>,
}
