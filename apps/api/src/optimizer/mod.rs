// Resume optimization: the convergence loop and its HTTP entry point.
// All generation goes through `llm_client::TextGenerator`, all compilation
// through `compiler::DocumentCompiler` — no direct API or subprocess calls here.

pub mod convergence;
pub mod handlers;
pub mod prompts;
pub mod transcript;

pub use convergence::{LoopPolicy, OptimizationResult, Optimizer};
