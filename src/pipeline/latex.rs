//! Markdown → LaTeX body transpiler.
//!
//! Covers the Markdown the math-html transcriber actually emits after HTML
//! conversion: headings, bullet and numbered lists, horizontal rules, `$$`
//! display blocks and inline `$…$` math. Everything else passes through as
//! plain text lines. Output is a LaTeX *body*: no preamble, no
//! `\begin{document}`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-*+]\s+(.*)").unwrap());
static RE_NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+[.)]\s+(.*)").unwrap());
static RE_INLINE_MATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$(.+?)\$").unwrap());
static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListState {
    None,
    Itemize,
    Enumerate,
}

impl ListState {
    fn environment(self) -> Option<&'static str> {
        match self {
            ListState::None => None,
            ListState::Itemize => Some("itemize"),
            ListState::Enumerate => Some("enumerate"),
        }
    }
}

struct Emitter {
    lines: Vec<String>,
    list: ListState,
}

impl Emitter {
    fn close_list(&mut self) {
        if let Some(env) = self.list.environment() {
            self.lines.push(format!("\\end{{{}}}", env));
        }
        self.list = ListState::None;
    }

    fn item(&mut self, kind: ListState, body: &str) {
        if self.list != kind {
            self.close_list();
            if let Some(env) = kind.environment() {
                self.lines.push(format!("\\begin{{{}}}", env));
            }
            self.list = kind;
        }
        self.lines.push(format!("\\item {}", inline_math(body.trim())));
    }
}

/// Transpile Markdown to a LaTeX body.
pub fn markdown_to_latex(markdown: &str) -> String {
    let lines: Vec<&str> = markdown.trim().lines().collect();
    let mut e = Emitter {
        lines: Vec::with_capacity(lines.len()),
        list: ListState::None,
    };

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim();
        i += 1;

        if line.is_empty() {
            e.close_list();
            e.lines.push(String::new());
            continue;
        }

        if line == "$$" {
            e.close_list();
            let start = i;
            while i < lines.len() && lines[i].trim() != "$$" {
                i += 1;
            }
            let expr = lines[start..i].join("\n");
            let expr = expr.trim();
            // Skip the closing fence if there is one.
            if i < lines.len() {
                i += 1;
            }
            if !expr.is_empty() {
                e.lines.push("\\[".to_string());
                e.lines.push(expr.to_string());
                e.lines.push("\\]".to_string());
            }
            continue;
        }

        if line.starts_with('#') {
            e.close_list();
            let title = line.trim_start_matches('#');
            let level = line.len() - title.len();
            let command = match level {
                1 => "\\section*",
                2 => "\\subsection*",
                _ => "\\subsubsection*",
            };
            e.lines.push(format!("{}{{{}}}", command, title.trim()));
            continue;
        }

        if line == "---" || line == "***" {
            e.close_list();
            e.lines.push("\\hrule".to_string());
            continue;
        }

        if let Some(caps) = RE_BULLET.captures(line) {
            e.item(ListState::Itemize, &caps[1]);
            continue;
        }

        if let Some(caps) = RE_NUMBERED.captures(line) {
            e.item(ListState::Enumerate, &caps[1]);
            continue;
        }

        e.close_list();
        e.lines.push(inline_math(line));
    }
    e.close_list();

    let joined = e.lines.join("\n");
    RE_BLANK_LINES.replace_all(&joined, "\n\n").trim().to_string()
}

/// `$expr$` → `\(expr\)`.
fn inline_math(text: &str) -> String {
    RE_INLINE_MATH
        .replace_all(text, |caps: &Captures| format!("\\({}\\)", caps[1].trim()))
        .into_owned()
}
