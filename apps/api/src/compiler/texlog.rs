//! pdflatex log inspection — page count and first fatal diagnostic.

use std::sync::LazyLock;

use regex::Regex;

/// Prefix pdflatex puts on the first line of an unrecoverable error.
pub const FATAL_MARKER: &str = "!";

/// Lines kept after the fatal marker line, giving the model enough context to fix it.
const CONTEXT_LINES_AFTER_MARKER: usize = 4;

pub const GENERIC_FAILURE: &str = "PDF compilation failed.";

static OUTPUT_WRITTEN: LazyLock<Regex> = LazyLock::new(|| {
    // Long output paths can wrap onto the next log line, hence (?s).
    Regex::new(r"(?s)Output written on .+?\((\d+) pages?").expect("static regex is valid")
});

/// Page count from `Output written on <file> (<N> page(s)`; 0 when the line is absent.
pub fn parse_page_count(log: &str) -> u32 {
    OUTPUT_WRITTEN
        .captures(log)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// The first `!` line plus the four lines that follow it, or a generic message.
pub fn extract_error_excerpt(log: &str) -> String {
    let lines: Vec<&str> = log.lines().collect();
    lines
        .iter()
        .position(|line| line.starts_with(FATAL_MARKER))
        .map(|start| {
            let end = (start + 1 + CONTEXT_LINES_AFTER_MARKER).min(lines.len());
            lines[start..end].join("\n")
        })
        .unwrap_or_else(|| GENERIC_FAILURE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUCCESS_LOG: &str = "\
This is pdfTeX, Version 3.141592653-2.6-1.40.25 (TeX Live 2023)
entering extended mode
(./resume.tex
LaTeX2e <2022-11-01> patch level 1
)
Output written on resume.pdf (2 pages, 48213 bytes).
Transcript written on resume.log.";

    const FAILURE_LOG: &str = "\
(./resume.tex
LaTeX2e <2022-11-01> patch level 1
! Undefined control sequence.
l.12 \\resumeItme
                {Built things}
The control sequence at the end of the top line
of your error message was never \\def'ed.
Here is how much of TeX's memory you used:";

    #[test]
    fn test_page_count_plural() {
        assert_eq!(parse_page_count(SUCCESS_LOG), 2);
    }

    #[test]
    fn test_page_count_singular() {
        let log = "Output written on resume.pdf (1 page, 30211 bytes).";
        assert_eq!(parse_page_count(log), 1);
    }

    #[test]
    fn test_page_count_wrapped_path() {
        let log = "Output written on /tmp/latex_compile_abcdef/some/really/long/path/\nresume.pdf (3 pages, 1 bytes).";
        assert_eq!(parse_page_count(log), 3);
    }

    #[test]
    fn test_page_count_missing_is_zero() {
        assert_eq!(parse_page_count("No pages of output."), 0);
        assert_eq!(parse_page_count(""), 0);
    }

    #[test]
    fn test_excerpt_is_marker_plus_four_lines() {
        let excerpt = extract_error_excerpt(FAILURE_LOG);
        let lines: Vec<&str> = excerpt.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "! Undefined control sequence.");
        assert_eq!(lines[4], "of your error message was never \\def'ed.");
    }

    #[test]
    fn test_excerpt_truncated_at_end_of_log() {
        let excerpt = extract_error_excerpt("line\n! Emergency stop.\n<*> resume.tex");
        assert_eq!(excerpt, "! Emergency stop.\n<*> resume.tex");
    }

    #[test]
    fn test_excerpt_without_marker_is_generic() {
        assert_eq!(extract_error_excerpt("nothing fatal here"), GENERIC_FAILURE);
    }
}
