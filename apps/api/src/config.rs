use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

/// System instruction bundled into the binary. Overridden by `SYSTEM_PROMPT_PATH`.
const BUNDLED_SYSTEM_PROMPT: &str = include_str!("../prompts/optimizer_system.md");

const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_COMPILE_TIMEOUT_SECS: u64 = 60;

/// Application configuration loaded from environment variables.
/// Loaded once at startup and passed by value into every constructor that needs it.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub anthropic_base_url: String,
    pub port: u16,
    pub rust_log: String,
    /// Explicit compiler binary. `None` means platform discovery (see `compiler::default_binary`).
    pub pdflatex_path: Option<PathBuf>,
    /// Wall-clock limit for a single compiler pass.
    pub compile_timeout: Duration,
    /// Optional wall-clock limit for one whole optimization loop.
    pub optimize_budget: Option<Duration>,
    pub static_dir: PathBuf,
    /// Optimizer system instruction, read once and shared immutably.
    pub system_prompt: Arc<str>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            anthropic_base_url: std::env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_ANTHROPIC_BASE_URL.to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            pdflatex_path: std::env::var("PDFLATEX_PATH").ok().map(PathBuf::from),
            compile_timeout: Duration::from_secs(
                optional_secs("COMPILE_TIMEOUT_SECS")?.unwrap_or(DEFAULT_COMPILE_TIMEOUT_SECS),
            ),
            optimize_budget: optional_secs("OPTIMIZE_BUDGET_SECS")?.map(Duration::from_secs),
            static_dir: std::env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("static")),
            system_prompt: load_system_prompt(std::env::var("SYSTEM_PROMPT_PATH").ok())?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_secs(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{key} must be a whole number of seconds")),
        Err(_) => Ok(None),
    }
}

fn load_system_prompt(path: Option<String>) -> Result<Arc<str>> {
    let Some(path) = path else {
        return Ok(Arc::from(BUNDLED_SYSTEM_PROMPT));
    };

    let prompt = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read system prompt from '{path}'"))?;
    tracing::info!("Loaded system prompt from {path} ({} chars)", prompt.len());
    Ok(Arc::from(prompt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_bundled_prompt_used_without_path() {
        let prompt = load_system_prompt(None).unwrap();
        assert_eq!(&*prompt, BUNDLED_SYSTEM_PROMPT);
        assert!(prompt.contains("LaTeX"));
    }

    #[test]
    fn test_prompt_read_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "custom instruction").unwrap();

        let path = file.path().to_string_lossy().into_owned();
        let prompt = load_system_prompt(Some(path)).unwrap();
        assert_eq!(&*prompt, "custom instruction");
    }

    #[test]
    fn test_missing_prompt_file_is_an_error() {
        let err = load_system_prompt(Some("/definitely/not/here.md".to_string())).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.md"));
    }
}
