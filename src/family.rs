//! Model families and target formats.
//!
//! Every model id belongs to exactly one [`ModelFamily`]. The family decides
//! which prompt the model receives, which backend endpoint it is served from,
//! and how its raw output is normalised. Rather than scattering membership
//! tests across those three places, each family maps to one static
//! [`FamilyProfile`] holding the family's prompt templates and postprocessor.
//! Endpoint resolution is the per-family table in
//! [`crate::config::DigitizerConfig::backend`].

use crate::error::DigitizeError;
use crate::pipeline::postprocess;
use crate::prompts;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The output representation a caller asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Markdown,
    Latex,
    /// Markdown text paired with the source page image.
    Layout,
}

impl TargetFormat {
    /// The text dialect the model is asked to produce for this format.
    ///
    /// `Layout` pages carry Markdown content next to their image.
    pub fn content_format(self) -> TargetFormat {
        match self {
            TargetFormat::Layout => TargetFormat::Markdown,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TargetFormat::Markdown => "markdown",
            TargetFormat::Latex => "latex",
            TargetFormat::Layout => "layout",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetFormat {
    type Err = DigitizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(TargetFormat::Markdown),
            "latex" | "tex" => Ok(TargetFormat::Latex),
            "layout" => Ok(TargetFormat::Layout),
            other => Err(DigitizeError::UnsupportedFormat {
                format: other.to_string(),
                detail: "expected one of markdown, latex, layout".into(),
            }),
        }
    }
}

/// Classification of a model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFamily {
    /// General-purpose vision chat models.
    Generic,
    /// OCR-specialised transcribers that take a terse instruction.
    StructuredTranscriber,
    /// Transcribers that emit Markdown with math as HTML `<math>` tags.
    MathHtmlTranscriber,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 3] = [
        ModelFamily::Generic,
        ModelFamily::StructuredTranscriber,
        ModelFamily::MathHtmlTranscriber,
    ];

    /// The capability table for this family.
    pub fn profile(self) -> &'static FamilyProfile {
        match self {
            ModelFamily::Generic => &GENERIC,
            ModelFamily::StructuredTranscriber => &STRUCTURED,
            ModelFamily::MathHtmlTranscriber => &MATH_HTML,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelFamily::Generic => "generic",
            ModelFamily::StructuredTranscriber => "structured-transcriber",
            ModelFamily::MathHtmlTranscriber => "math-html-transcriber",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-family prompt templates and output postprocessing.
pub struct FamilyProfile {
    /// Prompt for Markdown (and layout) output.
    pub markdown_prompt: &'static str,
    /// Prompt for LaTeX output.
    pub latex_prompt: &'static str,
    /// Turn raw model output into the requested content format.
    pub postprocess: fn(&str, TargetFormat) -> Result<String, DigitizeError>,
    /// Whether Markdown output gets `$…$` delimiter whitespace normalisation.
    pub normalize_math: bool,
}

impl FamilyProfile {
    pub fn prompt_for(&self, format: TargetFormat) -> &'static str {
        match format.content_format() {
            TargetFormat::Latex => self.latex_prompt,
            _ => self.markdown_prompt,
        }
    }
}

static GENERIC: FamilyProfile = FamilyProfile {
    markdown_prompt: prompts::GENERIC_MARKDOWN_PROMPT,
    latex_prompt: prompts::GENERIC_LATEX_PROMPT,
    postprocess: postprocess::passthrough,
    normalize_math: true,
};

static STRUCTURED: FamilyProfile = FamilyProfile {
    markdown_prompt: prompts::STRUCTURED_MARKDOWN_PROMPT,
    latex_prompt: prompts::STRUCTURED_LATEX_PROMPT,
    postprocess: postprocess::passthrough,
    normalize_math: true,
};

static MATH_HTML: FamilyProfile = FamilyProfile {
    markdown_prompt: prompts::MATH_HTML_MARKDOWN_PROMPT,
    latex_prompt: prompts::MATH_HTML_LATEX_PROMPT,
    postprocess: postprocess::math_html_to_format,
    normalize_math: false,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_uses_markdown_content() {
        assert_eq!(TargetFormat::Layout.content_format(), TargetFormat::Markdown);
        assert_eq!(TargetFormat::Latex.content_format(), TargetFormat::Latex);
    }

    #[test]
    fn parse_target_format() {
        assert_eq!("markdown".parse::<TargetFormat>().unwrap(), TargetFormat::Markdown);
        assert_eq!(" LaTeX ".parse::<TargetFormat>().unwrap(), TargetFormat::Latex);
        assert_eq!("layout".parse::<TargetFormat>().unwrap(), TargetFormat::Layout);
        let err = "docx".parse::<TargetFormat>().unwrap_err();
        assert!(matches!(err, DigitizeError::UnsupportedFormat { .. }));
    }

    #[test]
    fn only_math_html_skips_delimiter_normalisation() {
        assert!(ModelFamily::Generic.profile().normalize_math);
        assert!(ModelFamily::StructuredTranscriber.profile().normalize_math);
        assert!(!ModelFamily::MathHtmlTranscriber.profile().normalize_math);
    }

    #[test]
    fn layout_prompt_is_markdown_prompt() {
        for family in ModelFamily::ALL {
            let p = family.profile();
            assert_eq!(p.prompt_for(TargetFormat::Layout), p.markdown_prompt);
            assert_eq!(p.prompt_for(TargetFormat::Latex), p.latex_prompt);
        }
    }

    #[test]
    fn family_serialises_kebab_case() {
        let json = serde_json::to_string(&ModelFamily::MathHtmlTranscriber).unwrap();
        assert_eq!(json, "\"math-html-transcriber\"");
    }
}
