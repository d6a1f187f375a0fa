//! Minimal HTML → Markdown conversion for transcriber output.
//!
//! The math-html transcriber mixes Markdown with a small, predictable subset
//! of HTML: paragraphs, headings, emphasis, lists, links, tables, code and
//! the occasional `<img>`. This is a single-pass tag scanner over that
//! subset, not a general HTML parser:
//!
//! - line width is unlimited; text is never re-wrapped
//! - block elements end with a single line break
//! - images are dropped, links become `[text](href)`
//! - tables become GFM pipe tables with a separator after the first row;
//!   pipes inside cells are escaped
//! - `<script>`/`<style>` content is skipped, unknown tags are dropped
//!
//! Text between tags keeps its own newlines so `$$` fences produced by the
//! math-tag rewrite stay on their own lines.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<!--.*?-->|<(/?)([a-zA-Z][a-zA-Z0-9]*)((?:\s[^<>]*)?)/?>").unwrap()
});

static RE_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).unwrap());

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Convert HTML-flavoured Markdown to plain Markdown.
pub fn html_to_markdown(input: &str) -> String {
    let mut w = Writer::default();
    let mut last = 0;

    for caps in RE_TAG.captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        w.text(&input[last..whole.start()]);
        last = whole.end();

        // Comment: group 2 absent.
        let Some(name) = caps.get(2) else { continue };
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let attrs = caps.get(3).map_or("", |m| m.as_str());
        w.tag(&name.as_str().to_ascii_lowercase(), closing, attrs);
    }
    w.text(&input[last..]);

    w.finish()
}

#[derive(Debug, Clone, Copy)]
enum ListKind {
    Unordered,
    Ordered(usize),
}

#[derive(Default)]
struct Writer {
    out: String,
    lists: Vec<ListKind>,
    /// Open `<a>` tags: `Some(href)` when a `[` was emitted.
    links: Vec<Option<String>>,
    skip_depth: usize,
    pre_depth: usize,
    cell_depth: usize,
    table_row: usize,
    row_cells: usize,
}

impl Writer {
    fn text(&mut self, raw: &str) {
        if raw.is_empty() || self.skip_depth > 0 {
            return;
        }
        let decoded = html_escape::decode_html_entities(raw);
        if self.pre_depth > 0 {
            self.out.push_str(&decoded);
        } else if self.cell_depth > 0 {
            let flat = decoded.replace(['\n', '\t'], " ").replace('|', "\\|");
            self.out.push_str(&flat);
        } else {
            self.out.push_str(&decoded.replace('\t', " "));
        }
    }

    fn tag(&mut self, name: &str, closing: bool, attrs: &str) {
        if matches!(name, "script" | "style") {
            if closing {
                self.skip_depth = self.skip_depth.saturating_sub(1);
            } else {
                self.skip_depth += 1;
            }
            return;
        }
        if self.skip_depth > 0 {
            return;
        }

        match (name, closing) {
            ("p" | "div" | "section" | "article" | "blockquote", _) => self.line_break(),
            ("br", _) => self.out.push('\n'),
            ("hr", false) => {
                self.line_break();
                self.out.push_str("---\n");
            }
            ("h1" | "h2" | "h3" | "h4" | "h5" | "h6", false) => {
                self.line_break();
                let level = name[1..].parse::<usize>().unwrap_or(1);
                self.out.push_str(&"#".repeat(level));
                self.out.push(' ');
            }
            ("h1" | "h2" | "h3" | "h4" | "h5" | "h6", true) => self.line_break(),
            ("strong" | "b", _) => self.out.push_str("**"),
            ("em" | "i", _) => self.out.push('*'),
            ("code", _) if self.pre_depth == 0 => self.out.push('`'),
            ("pre", false) => {
                self.line_break();
                self.out.push_str("```\n");
                self.pre_depth += 1;
            }
            ("pre", true) => {
                self.pre_depth = self.pre_depth.saturating_sub(1);
                self.line_break();
                self.out.push_str("```\n");
            }
            ("ul", false) => {
                self.line_break();
                self.lists.push(ListKind::Unordered);
            }
            ("ol", false) => {
                self.line_break();
                self.lists.push(ListKind::Ordered(0));
            }
            ("ul" | "ol", true) => {
                self.lists.pop();
                self.line_break();
            }
            ("li", false) => self.list_item(),
            ("li", true) => self.line_break(),
            ("a", false) => {
                let href = RE_HREF.captures(attrs).and_then(|c| {
                    c.get(1)
                        .or_else(|| c.get(2))
                        .or_else(|| c.get(3))
                        .map(|m| m.as_str().to_string())
                });
                if href.is_some() {
                    self.out.push('[');
                }
                self.links.push(href);
            }
            ("a", true) => {
                if let Some(Some(href)) = self.links.pop() {
                    self.out.push_str("](");
                    self.out.push_str(&href);
                    self.out.push(')');
                }
            }
            ("table", _) => {
                self.line_break();
                self.table_row = 0;
            }
            ("tr", false) => {
                self.line_break();
                self.row_cells = 0;
            }
            ("tr", true) => self.end_row(),
            ("td" | "th", false) => {
                self.out.push_str(if self.row_cells == 0 { "| " } else { " | " });
                self.row_cells += 1;
                self.cell_depth += 1;
            }
            ("td" | "th", true) => self.cell_depth = self.cell_depth.saturating_sub(1),
            // img, span, sup, thead, tbody and anything unknown: tag dropped, text kept.
            _ => {}
        }
    }

    fn list_item(&mut self) {
        self.line_break();
        let depth = self.lists.len().max(1);
        self.out.push_str(&"  ".repeat(depth - 1));
        match self.lists.last_mut() {
            Some(ListKind::Ordered(n)) => {
                *n += 1;
                let marker = format!("{}. ", n);
                self.out.push_str(&marker);
            }
            _ => self.out.push_str("- "),
        }
    }

    fn end_row(&mut self) {
        if self.row_cells == 0 {
            return;
        }
        self.out.push_str(" |\n");
        if self.table_row == 0 {
            let sep = vec!["---"; self.row_cells].join(" | ");
            self.out.push_str(&format!("| {} |\n", sep));
        }
        self.table_row += 1;
        self.row_cells = 0;
    }

    fn line_break(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn finish(self) -> String {
        let trimmed = self
            .out
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");
        RE_BLANK_LINES
            .replace_all(&trimmed, "\n\n")
            .trim()
            .to_string()
    }
}
