//! Scripted stand-ins for the generator and the compiler, shared by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::compiler::{CompileFailureKind, CompileOutcome, DocumentCompiler};
use crate::llm_client::{LlmError, TextGenerator, Turn};

/// Returns `candidate N` on the N-th call, or an API error on the configured call.
#[derive(Default)]
pub struct ScriptedGenerator {
    fail_on_call: Option<usize>,
    calls: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the `call`-th request (1-based) with a 500 from the API.
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Transcripts received, one per call.
    pub fn transcripts(&self) -> Vec<Vec<Turn>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _system: &str, turns: &[Turn]) -> Result<String, LlmError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(turns.to_vec());
            calls.len()
        };
        if self.fail_on_call == Some(n) {
            return Err(LlmError::Api {
                status: 500,
                message: "upstream exploded".to_string(),
            });
        }
        Ok(format!("candidate {n}"))
    }
}

/// Plays back queued outcomes, then repeats the fallback forever.
pub struct ScriptedCompiler {
    queued: Mutex<VecDeque<CompileOutcome>>,
    fallback: CompileOutcome,
    sources: Mutex<Vec<String>>,
    available: bool,
}

impl ScriptedCompiler {
    pub fn always(outcome: CompileOutcome) -> Self {
        Self::sequence(Vec::new(), outcome)
    }

    pub fn sequence(outcomes: Vec<CompileOutcome>, fallback: CompileOutcome) -> Self {
        Self {
            queued: Mutex::new(outcomes.into()),
            fallback,
            sources: Mutex::new(Vec::new()),
            available: true,
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn sources(&self) -> Vec<String> {
        self.sources.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentCompiler for ScriptedCompiler {
    async fn compile(&self, source: &str) -> CompileOutcome {
        self.sources.lock().unwrap().push(source.to_string());
        self.queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }

    async fn probe(&self) -> Option<String> {
        self.available.then(|| "pdfTeX 3.141592653 (stub)".to_string())
    }
}

pub fn pages(page_count: u32) -> CompileOutcome {
    CompileOutcome::Success {
        pdf: Bytes::from_static(b"%PDF-1.5 stub"),
        page_count,
    }
}

pub fn broken(excerpt: &str) -> CompileOutcome {
    CompileOutcome::Failure {
        kind: CompileFailureKind::Diagnostic,
        excerpt: excerpt.to_string(),
    }
}

pub fn missing() -> CompileOutcome {
    CompileOutcome::Failure {
        kind: CompileFailureKind::CompilerMissing,
        excerpt: "pdflatex not found. Please ensure LaTeX is installed and in PATH.".to_string(),
    }
}
