// All LLM prompt templates for the convergence loop.
// The system instruction itself is configuration (see `Config::system_prompt`).

/// Summary returned whenever the loop ends with a candidate, converged or best-effort.
pub const SUCCESS_SUMMARY: &str = "Resume optimized successfully for the target position.";

/// Initial request. Replace `{job_description}` and `{latex}`.
pub const OPTIMIZATION_PROMPT_TEMPLATE: &str = r#"Please optimize the following LaTeX resume for this job description.

## Job Description:
{job_description}

## Current LaTeX Resume:
{latex}

## Instructions:
1. Follow every phase in your system prompt (Job Analysis → Gap Analysis → Optimization → One-Page Enforcement → Keyword Check).
2. Before returning the LaTeX, run the SELF-VALIDATION CHECKLIST from your system prompt. If any check fails, fix it before outputting.
3. Pay special attention to CRITICAL LATEX RULES — count arguments for every custom command, ensure list environments only contain \item entries, and verify all braces are balanced.
4. Return ONLY the complete, compilable LaTeX code. No markdown fences, no explanations, no commentary."#;

/// Compile-fix request after the draft. Replace `{compile_error}`.
pub const FIX_PROMPT_TEMPLATE: &str = r#"The LaTeX you returned failed to compile with this error:

```
{compile_error}
```

Find and fix the issue. Common causes:
- \resumeItem placed directly inside \resumeSubHeadingListStart without a \resumeItemListStart wrapper
- Custom command called with wrong number of arguments
- Bare text inside an itemize/enumerate without \item
- Unbalanced braces

Return ONLY the complete corrected LaTeX. No explanations, no markdown fences."#;

/// Single repair after a shrink edit broke compilation. Replace `{compile_error}`.
pub const SHRINK_FIX_PROMPT_TEMPLATE: &str = r#"The LaTeX failed to compile:

```
{compile_error}
```

Fix the error and return ONLY the complete corrected LaTeX."#;

/// One-page request. Replace `{page_count}`.
pub const SHRINK_PROMPT_TEMPLATE: &str = r#"The LaTeX you returned compiles but produces {page_count} pages. It MUST fit on exactly 1 page.

Apply these reduction strategies in order (Phase 4 from your instructions):

1. Trim content first (cut first → cut last):
   - Oldest or least relevant experience details
   - Reduce bullet points per role (3 max for older roles)
   - Consolidate similar skills
2. Then tighten spacing:
   - Reduce vertical spacing with \vspace{-Xpt} adjustments, never tighter than \vspace{-15pt} between sections
   - Remove blank lines that create extra space
   - Margins may be tightened but never below 0.5in
   - Font size may be 10-11pt but never below 10pt
3. Only then drop optional sections:
   - Publications (keep if research role, summarize to 1-2 lines otherwise)
   - Additional/Awards section (keep most impressive only)

Do NOT degrade the content quality — preserve the optimized wording and keywords.

Return ONLY the complete corrected LaTeX that fits on 1 page. No explanations, no markdown fences."#;

/// Fills both placeholders in one pass over the template, so neither input is
/// ever scanned for the other's placeholder.
pub fn optimization_prompt(latex: &str, job_description: &str) -> String {
    let (head, rest) = OPTIMIZATION_PROMPT_TEMPLATE
        .split_once("{job_description}")
        .unwrap_or((OPTIMIZATION_PROMPT_TEMPLATE, ""));
    let (middle, tail) = rest.split_once("{latex}").unwrap_or((rest, ""));
    [head, job_description, middle, latex, tail].concat()
}

pub fn fix_prompt(compile_error: &str) -> String {
    FIX_PROMPT_TEMPLATE.replace("{compile_error}", compile_error)
}

pub fn shrink_fix_prompt(compile_error: &str) -> String {
    SHRINK_FIX_PROMPT_TEMPLATE.replace("{compile_error}", compile_error)
}

pub fn shrink_prompt(page_count: u32) -> String {
    SHRINK_PROMPT_TEMPLATE.replace("{page_count}", &page_count.to_string())
}

pub fn failure_summary(reason: &str) -> String {
    format!("Optimization failed: {reason}")
}
