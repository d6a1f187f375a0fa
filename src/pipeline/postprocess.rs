//! Post-processing: turn each backend's raw output into the requested format.
//!
//! Backends speak three dialects. Generic and structured transcribers answer
//! directly in the requested format, so their output only gets the shared
//! math-delimiter cleanup. The math-html transcriber always answers in
//! Markdown with HTML sprinkled in (`<math>` tags, tables, paragraphs), so
//! its output is rewritten in a fixed order:
//!
//! 1. `<math>` tags → `$…$` / `$$…$$`, block pass before inline pass
//! 2. HTML → Markdown (see [`crate::pipeline::html`])
//! 3. Collapse 3+ newlines to one blank line, trim
//! 4. Markdown → LaTeX (latex target only, see [`crate::pipeline::latex`])
//!
//! Every postprocessor receives the *content* format: layout requests have
//! already been mapped to Markdown by the orchestrator, so seeing
//! [`TargetFormat::Layout`] here is a caller bug and fails with
//! [`DigitizeError::UnsupportedFormat`].

use crate::error::DigitizeError;
use crate::family::TargetFormat;
use crate::pipeline::{html, latex};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// ── Family postprocessors ────────────────────────────────────────────────────

/// Postprocessor for families that already answer in the requested format.
pub fn passthrough(content: &str, format: TargetFormat) -> Result<String, DigitizeError> {
    match format {
        TargetFormat::Markdown | TargetFormat::Latex => Ok(content.to_string()),
        TargetFormat::Layout => Err(unmapped_layout()),
    }
}

/// Postprocessor for the math-html transcriber family.
pub fn math_html_to_format(content: &str, format: TargetFormat) -> Result<String, DigitizeError> {
    match format {
        TargetFormat::Markdown => Ok(math_html_to_markdown(content)),
        TargetFormat::Latex => Ok(latex::markdown_to_latex(&math_html_to_markdown(content))),
        TargetFormat::Layout => Err(unmapped_layout()),
    }
}

fn math_html_to_markdown(content: &str) -> String {
    let s = rewrite_math_tags(content);
    let s = html::html_to_markdown(&s);
    collapse_blank_lines(s.trim()).trim().to_string()
}

fn unmapped_layout() -> DigitizeError {
    DigitizeError::UnsupportedFormat {
        format: TargetFormat::Layout.to_string(),
        detail: "layout must be mapped to markdown before postprocessing".to_string(),
    }
}

// ── Math tags ────────────────────────────────────────────────────────────────

static RE_MATH_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<math[^>]*display="block"[^>]*>(.*?)</math>"#).unwrap()
});

static RE_MATH_INLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<math[^>]*>(.*?)</math>").unwrap());

/// Rewrite `<math>` tags as Markdown math delimiters.
///
/// Display-block tags become a `$$` fence on their own lines; every other
/// `<math>` tag becomes `$expr$`. Entities inside the expression are decoded.
pub fn rewrite_math_tags(input: &str) -> String {
    let s = RE_MATH_BLOCK.replace_all(input, |caps: &Captures| {
        format!("\n$$\n{}\n$$\n", decode_expr(&caps[1]))
    });
    RE_MATH_INLINE
        .replace_all(&s, |caps: &Captures| format!("${}$", decode_expr(&caps[1])))
        .into_owned()
}

fn decode_expr(raw: &str) -> String {
    html_escape::decode_html_entities(raw.trim()).into_owned()
}

// ── Math delimiters ──────────────────────────────────────────────────────────

static RE_MARKDOWN_BLOCK_MATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\$\$\s*(.*?)\s*\$\$").unwrap());

static RE_MARKDOWN_INLINE_MATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\s*(.*?)\s*\$").unwrap());

/// Flatten `$…$` and `$$…$$` spans to their trimmed expression.
///
/// Block spans are removed first and may cross lines; inline spans never
/// cross a newline, so a stray currency sign cannot swallow the rest of the
/// page. `Area $ \pi r^2 $` becomes `Area \pi r^2`.
pub fn normalize_markdown_math(input: &str) -> String {
    let s = RE_MARKDOWN_BLOCK_MATH.replace_all(input, "$1");
    RE_MARKDOWN_INLINE_MATH.replace_all(&s, "$1").into_owned()
}

// ── Whitespace ───────────────────────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Collapse three or more consecutive newlines to a single blank line.
pub fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_math_before_inline() {
        let input = r#"Energy <math display="block">E = mc^2</math> and <math>a+b</math>."#;
        let out = rewrite_math_tags(input);
        assert_eq!(out, "Energy \n$$\nE = mc^2\n$$\n and $a+b$.");
    }

    #[test]
    fn test_math_tags_case_insensitive_multiline() {
        let input = "<MATH class=\"x\" display=\"block\">\n  x &lt; y\n</MATH>";
        assert_eq!(rewrite_math_tags(input), "\n$$\nx < y\n$$\n");
    }

    #[test]
    fn test_math_free_input_unchanged() {
        let input = "# Heading\n\nPlain paragraph with $x$.\n";
        assert_eq!(rewrite_math_tags(input), input);
    }

    #[test]
    fn test_normalize_math_strips_delimiters() {
        assert_eq!(normalize_markdown_math("$ x^2 $ and $$\n y \n$$"), "x^2 and y");
        assert_eq!(
            normalize_markdown_math("Area $ \\pi r^2 $ and $$ E=mc^2 $$"),
            "Area \\pi r^2 and E=mc^2"
        );
    }

    #[test]
    fn test_normalize_math_idempotent() {
        let once = normalize_markdown_math("a $ b $ c $$ d $$");
        assert_eq!(normalize_markdown_math(&once), once);
    }

    #[test]
    fn test_normalize_math_does_not_cross_lines() {
        let input = "costs $5\nand $6 total";
        assert_eq!(normalize_markdown_math(input), input);
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\nb\n\nc"), "a\n\nb\n\nc");
    }

    #[test]
    fn test_passthrough_rejects_layout() {
        assert_eq!(passthrough(" raw ", TargetFormat::Latex).unwrap(), " raw ");
        assert!(matches!(
            passthrough("x", TargetFormat::Layout),
            Err(DigitizeError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_math_html_to_markdown() {
        let raw = "<p>Area is <math>\\pi r^2</math></p>\n\n\n\n<p>Done &amp; dusted</p>";
        let out = math_html_to_format(raw, TargetFormat::Markdown).unwrap();
        assert_eq!(out, "Area is $\\pi r^2$\n\nDone & dusted");
    }

    #[test]
    fn test_math_html_to_latex() {
        let raw = "<h2>Results</h2><ul><li>mass <math>m</math></li></ul>\
                   <math display=\"block\">F = ma</math>";
        let out = math_html_to_format(raw, TargetFormat::Latex).unwrap();
        assert!(out.starts_with("\\subsection*{Results}"), "got: {out}");
        assert!(out.contains("\\begin{itemize}\n\\item mass \\(m\\)\n\\end{itemize}"), "got: {out}");
        assert!(out.ends_with("\\[\nF = ma\n\\]"), "got: {out}");
    }

    #[test]
    fn test_math_html_rejects_layout() {
        assert!(matches!(
            math_html_to_format("x", TargetFormat::Layout),
            Err(DigitizeError::UnsupportedFormat { .. })
        ));
    }
}
