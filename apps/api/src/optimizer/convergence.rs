//! Convergence Loop — drives the generator until the document compiles and fits one page.
//!
//! # States
//! `Drafting → CompileChecking ⇄ Fixing → PageChecking ⇄ Shrinking → Done`
//!
//! - Compile failures after the draft get up to `max_fix_attempts` repairs.
//! - Each shrink attempt that breaks compilation gets exactly one repair.
//! - Exhausting either budget ends the run with the last candidate and a warning
//!   (best effort), never with an error.
//! - A missing compiler binary is never sent back for repair; the run ends
//!   best effort with the current candidate.
//! - Only an unrecoverable condition (generator failure, cancellation, budget)
//!   reverts to the caller's original document.
//!
//! One transcript spans both phases so every correction request is grounded in
//! the model's own previous output and the exact diagnostic or page count.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::compiler::{CompileFailureKind, CompileOutcome, DocumentCompiler};
use crate::llm_client::{LlmError, TextGenerator};
use crate::optimizer::prompts;
use crate::optimizer::transcript::{Transcript, TranscriptError};

pub const MAX_FIX_ATTEMPTS: u32 = 2;
pub const MAX_PAGE_SHRINK_ATTEMPTS: u32 = 2;
/// Repairs allowed after a shrink edit breaks compilation.
const SHRINK_FIX_ATTEMPTS: u32 = 1;
const TARGET_PAGES: u32 = 1;

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Retry budgets and the optional overall deadline for one run.
#[derive(Debug, Clone)]
pub struct LoopPolicy {
    pub max_fix_attempts: u32,
    pub max_shrink_attempts: u32,
    /// Wall-clock limit for the whole run. `None` means unbounded.
    pub budget: Option<Duration>,
}

impl Default for LoopPolicy {
    fn default() -> Self {
        Self {
            max_fix_attempts: MAX_FIX_ATTEMPTS,
            max_shrink_attempts: MAX_PAGE_SHRINK_ATTEMPTS,
            budget: None,
        }
    }
}

/// Counters describing how a run went. Observability only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    pub generation_calls: u32,
    pub compile_attempts: u32,
    pub fix_attempts: u32,
    pub shrink_attempts: u32,
    /// Page count of the last compile attempt (0 if it failed).
    pub final_page_count: u32,
    /// Whether the returned document compiled on its last attempt.
    pub compiled: bool,
}

/// Terminal value of a run.
///
/// `success == false` always carries the caller's original document.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    pub final_document_text: String,
    pub summary_text: String,
    pub success: bool,
    pub stats: LoopStats,
}

/// Conditions that abort a run and revert to the original document.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error(transparent)]
    Generation(#[from] LlmError),

    #[error(transparent)]
    Transcript(#[from] TranscriptError),

    #[error("optimization was cancelled")]
    Cancelled,

    #[error("optimization exceeded its {0:?} budget")]
    BudgetExceeded(Duration),
}

// ────────────────────────────────────────────────────────────────────────────
// State machine
// ────────────────────────────────────────────────────────────────────────────

/// Which phase a compile check belongs to; decides the repair budget and prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Draft,
    Shrink { attempt: u32 },
}

#[derive(Debug)]
enum State {
    Drafting,
    CompileChecking { phase: Phase, fixes_used: u32 },
    Fixing { phase: Phase, attempt: u32, excerpt: String },
    PageChecking { page_count: u32, shrinks_used: u32 },
    Shrinking { attempt: u32, page_count: u32 },
    Done(Exit),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Converged,
    /// Repair budget spent; the last candidate still does not compile.
    StillBroken,
    /// Shrink budget spent; the last candidate still exceeds one page.
    StillTooLong,
    /// No compiler binary; the candidate is returned without further edits.
    CompilerUnavailable,
}

/// Orchestrates generator and compiler. Shareable across concurrent requests:
/// every run owns its transcript and compiler working directories.
pub struct Optimizer {
    generator: Arc<dyn TextGenerator>,
    compiler: Arc<dyn DocumentCompiler>,
    system_prompt: Arc<str>,
    policy: LoopPolicy,
}

impl Optimizer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        compiler: Arc<dyn DocumentCompiler>,
        system_prompt: Arc<str>,
        policy: LoopPolicy,
    ) -> Self {
        Self {
            generator,
            compiler,
            system_prompt,
            policy,
        }
    }

    /// Optimizes `document` for `job_description`. Never fails: unrecoverable
    /// conditions yield `success == false` with the original document.
    pub async fn optimize(
        &self,
        document: &str,
        job_description: &str,
        cancel: &CancellationToken,
    ) -> OptimizationResult {
        let span = info_span!("optimize", request_id = %Uuid::new_v4());
        async move {
            info!(
                latex_chars = document.len(),
                jd_chars = job_description.len(),
                "OPTIMIZATION REQUEST"
            );

            let mut run = Run {
                optimizer: self,
                cancel,
                deadline: self.policy.budget.map(|budget| (Instant::now() + budget, budget)),
                transcript: Transcript::new(),
                candidate: String::new(),
                stats: LoopStats::default(),
            };

            match run.drive(document, job_description).await {
                Ok(exit) => {
                    info!(
                        chars = run.candidate.len(),
                        pages = run.stats.final_page_count,
                        generation_calls = run.stats.generation_calls,
                        turns = run.transcript.len(),
                        ?exit,
                        "DONE"
                    );
                    OptimizationResult {
                        final_document_text: run.candidate,
                        summary_text: prompts::SUCCESS_SUMMARY.to_string(),
                        success: true,
                        stats: run.stats,
                    }
                }
                Err(e) => {
                    error!("OPTIMIZATION FAILED: {e}");
                    OptimizationResult {
                        final_document_text: document.to_string(),
                        summary_text: prompts::failure_summary(&e.to_string()),
                        success: false,
                        stats: run.stats,
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Mutable state of a single run.
struct Run<'a> {
    optimizer: &'a Optimizer,
    cancel: &'a CancellationToken,
    deadline: Option<(Instant, Duration)>,
    transcript: Transcript,
    candidate: String,
    stats: LoopStats,
}

impl Run<'_> {
    async fn drive(&mut self, document: &str, job_description: &str) -> Result<Exit, LoopError> {
        let optimizer: &Optimizer = self.optimizer;
        let policy = &optimizer.policy;
        let mut state = State::Drafting;

        loop {
            if let State::Done(exit) = state {
                return Ok(exit);
            }
            self.checkpoint()?;

            state = match state {
                State::Drafting => {
                    info!("Calling generator for optimization draft");
                    self.request(prompts::optimization_prompt(document, job_description))
                        .await?;
                    State::CompileChecking {
                        phase: Phase::Draft,
                        fixes_used: 0,
                    }
                }

                State::CompileChecking { phase, fixes_used } => match self.compile().await {
                    CompileOutcome::Success { page_count, .. } => State::PageChecking {
                        page_count,
                        shrinks_used: match phase {
                            Phase::Draft => 0,
                            Phase::Shrink { attempt } => attempt,
                        },
                    },
                    CompileOutcome::Failure {
                        kind: CompileFailureKind::CompilerMissing,
                        ..
                    } => {
                        warn!(?phase, "Compiler unavailable, returning last version unchecked");
                        State::Done(Exit::CompilerUnavailable)
                    }
                    CompileOutcome::Failure { excerpt, .. } => {
                        let budget = match phase {
                            Phase::Draft => policy.max_fix_attempts,
                            Phase::Shrink { .. } => SHRINK_FIX_ATTEMPTS,
                        };
                        if fixes_used < budget {
                            State::Fixing {
                                phase,
                                attempt: fixes_used + 1,
                                excerpt,
                            }
                        } else {
                            warn!(
                                fixes_used,
                                ?phase,
                                "Fix attempts exhausted, returning last version (does not compile)"
                            );
                            State::Done(Exit::StillBroken)
                        }
                    }
                },

                State::Fixing {
                    phase,
                    attempt,
                    excerpt,
                } => {
                    info!(attempt, ?phase, "Asking generator to fix compilation error");
                    self.stats.fix_attempts += 1;
                    let prompt = match phase {
                        Phase::Draft => prompts::fix_prompt(&excerpt),
                        Phase::Shrink { .. } => prompts::shrink_fix_prompt(&excerpt),
                    };
                    self.request(prompt).await?;
                    State::CompileChecking {
                        phase,
                        fixes_used: attempt,
                    }
                }

                State::PageChecking {
                    page_count,
                    shrinks_used,
                } => {
                    if page_count <= TARGET_PAGES {
                        State::Done(Exit::Converged)
                    } else if shrinks_used < policy.max_shrink_attempts {
                        State::Shrinking {
                            attempt: shrinks_used + 1,
                            page_count,
                        }
                    } else {
                        warn!(
                            page_count,
                            shrinks_used, "Still over one page after shrinking, returning as-is"
                        );
                        State::Done(Exit::StillTooLong)
                    }
                }

                State::Shrinking {
                    attempt,
                    page_count,
                } => {
                    info!(attempt, page_count, "Asking generator to shrink to 1 page");
                    self.stats.shrink_attempts += 1;
                    self.request(prompts::shrink_prompt(page_count)).await?;
                    State::CompileChecking {
                        phase: Phase::Shrink { attempt },
                        fixes_used: 0,
                    }
                }

                State::Done(exit) => State::Done(exit),
            };
        }
    }

    /// Appends a user turn, calls the generator with the whole transcript and
    /// records its answer as the new candidate.
    async fn request(&mut self, prompt: String) -> Result<(), LoopError> {
        self.transcript.push_user(prompt)?;
        self.stats.generation_calls += 1;

        let candidate = self
            .optimizer
            .generator
            .generate(&self.optimizer.system_prompt, self.transcript.turns())
            .await?;

        info!(
            chars = candidate.len(),
            turns = self.transcript.len() + 1,
            "Received candidate"
        );
        self.transcript.push_assistant(candidate.clone())?;
        self.candidate = candidate;
        Ok(())
    }

    async fn compile(&mut self) -> CompileOutcome {
        self.stats.compile_attempts += 1;
        let outcome = self.optimizer.compiler.compile(&self.candidate).await;

        self.stats.compiled = outcome.is_success();
        self.stats.final_page_count = outcome.page_count();
        match outcome.error_excerpt() {
            None => info!(page_count = self.stats.final_page_count, "Compilation passed"),
            Some(excerpt) => warn!(
                "Compilation failed: {}",
                excerpt.chars().take(300).collect::<String>()
            ),
        }
        outcome
    }

    fn checkpoint(&self) -> Result<(), LoopError> {
        if self.cancel.is_cancelled() {
            return Err(LoopError::Cancelled);
        }
        if let Some((deadline, budget)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(LoopError::BudgetExceeded(budget));
            }
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
