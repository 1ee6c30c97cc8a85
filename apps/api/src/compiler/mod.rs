//! Document compiler adapter — runs pdflatex in a disposable working directory.
//!
//! Each `compile` call:
//! 1. creates a fresh `TempDir` and writes `resume.tex` into it
//! 2. runs two passes (cross-references only settle on the second)
//! 3. reads page count and the first fatal diagnostic from `resume.log`
//! 4. returns a `CompileOutcome` — failures are values, not errors
//!
//! The `TempDir` is removed on drop, so every exit path (timeout, missing binary,
//! I/O error) cleans up. Calls share no state and can run concurrently.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::config::Config;

pub mod handlers;
pub mod texlog;

const SOURCE_FILE: &str = "resume.tex";
const LOG_FILE: &str = "resume.log";
const PDF_FILE: &str = "resume.pdf";
const PASSES: u32 = 2;
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const WORKDIR_PREFIX: &str = "latex_compile_";

pub const DEFAULT_PASS_TIMEOUT: Duration = Duration::from_secs(60);

// ────────────────────────────────────────────────────────────────────────────
// Outcome types
// ────────────────────────────────────────────────────────────────────────────

/// Why a compile attempt produced no PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileFailureKind {
    /// The compiler ran and reported an error in its log.
    Diagnostic,
    /// A pass exceeded the wall-clock limit.
    Timeout,
    /// The compiler binary could not be found.
    CompilerMissing,
    /// The working directory could not be prepared or read.
    Io,
}

/// Result of one compile attempt. Produced fresh per attempt, never mutated.
#[derive(Debug, Clone)]
pub enum CompileOutcome {
    Success {
        pdf: Bytes,
        /// 0 when the log carried no page count even though a PDF exists.
        page_count: u32,
    },
    Failure {
        kind: CompileFailureKind,
        excerpt: String,
    },
}

impl CompileOutcome {
    fn failure(kind: CompileFailureKind, excerpt: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            excerpt: excerpt.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Rendered page count; always 0 for a failure.
    pub fn page_count(&self) -> u32 {
        match self {
            Self::Success { page_count, .. } => *page_count,
            Self::Failure { .. } => 0,
        }
    }

    /// Diagnostic text; present iff the attempt failed.
    pub fn error_excerpt(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { excerpt, .. } => Some(excerpt),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trait
// ────────────────────────────────────────────────────────────────────────────

/// Compile-and-measure oracle used by the convergence loop and the compile endpoint.
#[async_trait]
pub trait DocumentCompiler: Send + Sync {
    async fn compile(&self, source: &str) -> CompileOutcome;

    /// Version line of the compiler when it is installed and runnable.
    async fn probe(&self) -> Option<String>;
}

// ────────────────────────────────────────────────────────────────────────────
// pdflatex
// ────────────────────────────────────────────────────────────────────────────

/// pdflatex subprocess adapter.
#[derive(Debug, Clone)]
pub struct PdfLatex {
    binary: PathBuf,
    leading_args: Vec<OsString>,
    pass_timeout: Duration,
    work_root: Option<PathBuf>,
}

enum PassError {
    Timeout,
    Missing,
    Io(io::Error),
}

impl PdfLatex {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            leading_args: Vec::new(),
            pass_timeout: DEFAULT_PASS_TIMEOUT,
            work_root: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let binary = config.pdflatex_path.clone().unwrap_or_else(default_binary);
        info!("Using pdflatex: {}", binary.display());
        Self::new(binary).with_pass_timeout(config.compile_timeout)
    }

    /// Arguments placed before the pdflatex flags (wrapper scripts, engine selectors).
    #[cfg(test)]
    pub fn with_leading_args(mut self, args: Vec<OsString>) -> Self {
        self.leading_args = args;
        self
    }

    pub fn with_pass_timeout(mut self, timeout: Duration) -> Self {
        self.pass_timeout = timeout;
        self
    }

    /// Directory under which working directories are created (system temp dir by default).
    #[cfg(test)]
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = Some(root.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.leading_args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    fn create_workdir(&self) -> io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKDIR_PREFIX);
        match &self.work_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    async fn run_pass(&self, dir: &Path, pass: u32) -> Result<(), PassError> {
        let mut cmd = self.command();
        cmd.args([
            "-interaction=nonstopmode",
            "-halt-on-error",
            "-output-directory",
            ".",
            SOURCE_FILE,
        ])
        .current_dir(dir);

        let output = match tokio::time::timeout(self.pass_timeout, cmd.output()).await {
            Err(_) => return Err(PassError::Timeout),
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => return Err(PassError::Missing),
            Ok(Err(e)) => return Err(PassError::Io(e)),
            Ok(Ok(output)) => output,
        };

        if output.status.success() {
            info!(pass, passes = PASSES, "pdflatex pass succeeded");
            return Ok(());
        }

        // A failing pass is not fatal here; the log decides the outcome.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let tail: Vec<&str> = stdout.lines().rev().take(20).collect();
        warn!(
            pass,
            exit_code = output.status.code().unwrap_or(-1),
            "pdflatex pass failed, last {} lines of output:",
            tail.len()
        );
        for line in tail.iter().rev() {
            warn!("  | {line}");
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            warn!("stderr: {}", stderr.trim().chars().take(500).collect::<String>());
        }
        Ok(())
    }

    async fn compile_in(&self, dir: &Path, source: &str) -> CompileOutcome {
        if let Err(e) = tokio::fs::write(dir.join(SOURCE_FILE), source).await {
            error!("Failed to write LaTeX source: {e}");
            return CompileOutcome::failure(CompileFailureKind::Io, format!("Compilation error: {e}"));
        }

        for pass in 1..=PASSES {
            match self.run_pass(dir, pass).await {
                Ok(()) => {}
                Err(PassError::Timeout) => {
                    error!(
                        "COMPILATION TIMEOUT — pdflatex exceeded {}s",
                        self.pass_timeout.as_secs()
                    );
                    return CompileOutcome::failure(
                        CompileFailureKind::Timeout,
                        format!(
                            "LaTeX compilation timed out after {} seconds.",
                            self.pass_timeout.as_secs()
                        ),
                    );
                }
                Err(PassError::Missing) => {
                    error!("pdflatex NOT FOUND at {}", self.binary.display());
                    return CompileOutcome::failure(
                        CompileFailureKind::CompilerMissing,
                        "pdflatex not found. Please ensure LaTeX is installed and in PATH.",
                    );
                }
                Err(PassError::Io(e)) => {
                    error!("pdflatex could not be run: {e}");
                    return CompileOutcome::failure(
                        CompileFailureKind::Io,
                        format!("Compilation error: {e}"),
                    );
                }
            }
        }

        let log_text = match tokio::fs::read(dir.join(LOG_FILE)).await {
            Ok(raw) => String::from_utf8_lossy(&raw).into_owned(),
            Err(_) => String::new(),
        };
        let page_count = texlog::parse_page_count(&log_text);

        match tokio::fs::read(dir.join(PDF_FILE)).await {
            Ok(pdf) => {
                info!(
                    pdf_bytes = pdf.len(),
                    page_count, "COMPILATION SUCCESS"
                );
                CompileOutcome::Success {
                    pdf: Bytes::from(pdf),
                    page_count,
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let excerpt = texlog::extract_error_excerpt(&log_text);
                error!("COMPILATION FAILED — no PDF generated: {excerpt}");
                CompileOutcome::failure(CompileFailureKind::Diagnostic, excerpt)
            }
            Err(e) => {
                error!("Failed to read generated PDF: {e}");
                CompileOutcome::failure(CompileFailureKind::Io, format!("Compilation error: {e}"))
            }
        }
    }
}

#[async_trait]
impl DocumentCompiler for PdfLatex {
    async fn compile(&self, source: &str) -> CompileOutcome {
        info!(source_chars = source.len(), "PDF compilation request");

        let workdir = match self.create_workdir() {
            Ok(dir) => dir,
            Err(e) => {
                error!("Failed to create working directory: {e}");
                return CompileOutcome::failure(
                    CompileFailureKind::Io,
                    format!("Compilation error: {e}"),
                );
            }
        };

        let outcome = self.compile_in(workdir.path(), source).await;

        let path = workdir.path().to_path_buf();
        if let Err(e) = workdir.close() {
            warn!("Failed to remove working directory {}: {e}", path.display());
        }
        outcome
    }

    async fn probe(&self) -> Option<String> {
        let mut cmd = self.command();
        cmd.arg("--version");

        match tokio::time::timeout(PROBE_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let version = stdout.lines().next().unwrap_or_default().trim().to_string();
                info!("pdflatex available: {version}");
                Some(version)
            }
            Ok(Ok(_)) => {
                warn!("pdflatex found but returned non-zero exit code");
                None
            }
            Ok(Err(e)) => {
                warn!("pdflatex not available: {e}");
                None
            }
            Err(_) => {
                warn!("pdflatex --version timed out");
                None
            }
        }
    }
}

/// Platform default compiler: the per-user MiKTeX install on Windows when present,
/// otherwise `pdflatex` resolved from PATH.
pub fn default_binary() -> PathBuf {
    if cfg!(windows) {
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            let miktex: PathBuf = [
                local.as_str(),
                "Programs",
                "MiKTeX",
                "miktex",
                "bin",
                "x64",
                "pdflatex.exe",
            ]
            .iter()
            .collect();
            if miktex.exists() {
                return miktex;
            }
        }
    }
    PathBuf::from("pdflatex")
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
