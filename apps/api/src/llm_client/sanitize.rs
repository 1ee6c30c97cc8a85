//! Response sanitizer — removes markdown code fences the model wraps around documents.

const FENCE: &str = "```";

/// Strips a leading ```` ``` ```` / ```` ```latex ```` fence and a trailing ```` ``` ````,
/// then trims surrounding whitespace.
///
/// Applied until nothing changes, so `strip_code_fences(strip_code_fences(t))`
/// always equals `strip_code_fences(t)`. Interior lines are never touched.
pub fn strip_code_fences(text: &str) -> String {
    let mut current = text.trim();
    loop {
        let next = strip_once(current);
        if next.len() == current.len() {
            return current.to_string();
        }
        current = next;
    }
}

fn strip_once(text: &str) -> &str {
    let mut body = text;

    if let Some(rest) = body.strip_prefix(FENCE) {
        // A language tag is the remainder of the opening line, when it is a single word.
        body = match rest.split_once('\n') {
            Some((tag, after)) if is_language_tag(tag) => after,
            None if is_language_tag(rest) => "",
            _ => rest,
        };
    }

    if let Some(rest) = body.strip_suffix(FENCE) {
        body = rest;
    }

    body.trim()
}

fn is_language_tag(candidate: &str) -> bool {
    candidate
        .trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences_with_latex_tag() {
        let input = "```latex\n\\documentclass{article}\n```";
        assert_eq!(strip_code_fences(input), "\\documentclass{article}");
    }

    #[test]
    fn test_strip_fences_with_other_tag() {
        assert_eq!(strip_code_fences("```tex\nX\n```"), "X");
    }

    #[test]
    fn test_strip_fences_without_tag() {
        assert_eq!(strip_code_fences("```\nX\n```"), "X");
    }

    #[test]
    fn test_no_fences_is_trimmed_input() {
        let input = "  \n\\begin{document}\nHello\n\\end{document}\n\n";
        assert_eq!(
            strip_code_fences(input),
            "\\begin{document}\nHello\n\\end{document}"
        );
    }

    #[test]
    fn test_leading_only_fence() {
        assert_eq!(strip_code_fences("```latex\nX"), "X");
    }

    #[test]
    fn test_trailing_only_fence() {
        assert_eq!(strip_code_fences("X\n```"), "X");
    }

    #[test]
    fn test_interior_fence_untouched() {
        let input = "\\begin{verbatim}\n```\ncode\n```\n\\end{verbatim}";
        assert_eq!(strip_code_fences(input), input);
    }

    #[test]
    fn test_fence_with_surrounding_whitespace() {
        assert_eq!(strip_code_fences("\n  ```latex\nX\n```  \n"), "X");
    }

    #[test]
    fn test_idempotent_on_assorted_inputs() {
        let samples = [
            "",
            "```",
            "``````",
            "```latex",
            "```latex\n```",
            "```\n```\nnested\n```\n```",
            "```latex\n\\section{Experience}\n\\item Rust\n```",
            "plain text",
            "   padded   ",
            "```not a tag line\nbody\n```",
            "\\verb|```|",
        ];
        for sample in samples {
            let once = strip_code_fences(sample);
            let twice = strip_code_fences(&once);
            assert_eq!(once, twice, "not idempotent for {sample:?}");
        }
    }
}
