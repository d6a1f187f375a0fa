//! Prompts sent to the vision models.
//!
//! Centralising every prompt here keeps the (format, family) dispatch matrix
//! in one place, and lets unit tests inspect prompts without a live backend.
//! The family → template mapping itself lives in
//! [`crate::family::FamilyProfile`]; this module owns the text.

use crate::family::{ModelFamily, TargetFormat};

/// General vision models, Markdown output. Math is flattened into the prose
/// because these models produce unreliable TeX.
pub const GENERIC_MARKDOWN_PROMPT: &str = "Convert the provided document into clean Markdown. \
Preserve headings, lists, tables, and inline formatting. \
Write mathematical expressions as plain text within the flow, without dollar signs or any other TeX delimiters. \
Do not add commentary.";

/// General vision models, LaTeX output.
pub const GENERIC_LATEX_PROMPT: &str = "Convert the provided document into well-formed LaTeX. \
Include document structure with sections, lists, tables, and suitable math environments \
(equation, align, or inline math) where needed. \
Return only valid LaTeX body content and do not use Markdown syntax.";

/// OCR transcribers respond best to their short native instruction.
pub const STRUCTURED_MARKDOWN_PROMPT: &str = "Transcribe the document in the image into Markdown format.";

pub const STRUCTURED_LATEX_PROMPT: &str = "Transcribe the document in the image into LaTeX body content.";

/// Math-HTML transcribers, Markdown output.
pub const MATH_HTML_MARKDOWN_PROMPT: &str = "Transcribe the document in the image into GitHub-flavored Markdown. \
Preserve headings, ordered and unordered lists, tables, and mathematical expressions. \
Use Markdown syntax only: '#' for headings, '-' for list items, pipes for tables, \
'$...$' for inline math and '$$...$$' for block math. \
Do not include HTML or XML tags, code fences, or commentary.";

/// Math-HTML transcribers, LaTeX output.
pub const MATH_HTML_LATEX_PROMPT: &str = "Transcribe the document in the image into LaTeX body content. \
Preserve structural elements such as sections, lists, tables, and equations using standard LaTeX environments. \
Return only valid LaTeX, without HTML, XML, or code fences, and do not add commentary.";

/// Build the instruction for one inference call.
///
/// When both `page_number` and `total_pages` are given, an isolation clause is
/// appended. Multi-page PDFs are sent one page per call, and without the
/// clause models invent continuity with pages they never saw.
pub fn build_prompt(
    target_format: TargetFormat,
    family: ModelFamily,
    page_number: Option<usize>,
    total_pages: Option<usize>,
) -> String {
    let base = family.profile().prompt_for(target_format);
    match (page_number, total_pages) {
        (Some(page), Some(total)) => format!("{base}{}", page_context(page, total)),
        _ => base.to_string(),
    }
}

fn page_context(page: usize, total: usize) -> String {
    format!(
        " Focus exclusively on the content of page {page} out of {total}. \
Do not reference or infer details from other pages."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMATS: [TargetFormat; 3] = [
        TargetFormat::Markdown,
        TargetFormat::Latex,
        TargetFormat::Layout,
    ];

    #[test]
    fn every_pair_has_a_prompt() {
        for format in FORMATS {
            for family in ModelFamily::ALL {
                let p = build_prompt(format, family, None, None);
                assert!(!p.is_empty(), "{format}/{family}");
                assert!(!p.contains("out of"), "{format}/{family}: {p}");
            }
        }
    }

    #[test]
    fn isolation_clause_only_with_both_positions() {
        for format in FORMATS {
            for family in ModelFamily::ALL {
                let full = build_prompt(format, family, Some(2), Some(5));
                assert!(full.contains("page 2 out of 5"), "{full}");
                assert!(full.contains("Do not reference or infer details from other pages."));

                assert!(!build_prompt(format, family, Some(2), None).contains("out of"));
                assert!(!build_prompt(format, family, None, Some(5)).contains("out of"));
            }
        }
    }

    #[test]
    fn layout_matches_markdown() {
        for family in ModelFamily::ALL {
            assert_eq!(
                build_prompt(TargetFormat::Layout, family, None, None),
                build_prompt(TargetFormat::Markdown, family, None, None)
            );
        }
    }

    #[test]
    fn generic_markdown_forbids_tex_delimiters() {
        let p = build_prompt(TargetFormat::Markdown, ModelFamily::Generic, None, None);
        assert!(p.contains("without dollar signs"));
    }

    #[test]
    fn math_html_markdown_asks_for_dollar_math() {
        let p = build_prompt(
            TargetFormat::Markdown,
            ModelFamily::MathHtmlTranscriber,
            None,
            None,
        );
        assert!(p.contains("'$$...$$'"));
        assert!(p.contains("Do not include HTML"));
    }

    #[test]
    fn structured_latex_is_terse() {
        assert_eq!(
            build_prompt(TargetFormat::Latex, ModelFamily::StructuredTranscriber, None, None),
            STRUCTURED_LATEX_PROMPT
        );
    }
}
