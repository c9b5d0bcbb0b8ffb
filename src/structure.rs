//! Root-structure analysis for markup blocks.
//!
//! No markup parser is involved. The analysis masks template expressions,
//! then looks at the trimmed body with a small tag scanner:
//!
//! - body opens with `<tag ...>` and ends with the matching `</tag>` that
//!   closes the opening one: the body has a root element;
//! - no element marker between the root's tags: [`RootKind::Single`];
//! - element markers between the root's tags: [`RootKind::Container`];
//! - anything else: [`RootKind::Normal`].

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Pattern matching one masked expression placeholder.
pub(crate) const PLACEHOLDER_PATTERN: &str = r"__SCOPED_EXPR_(\d+)__";

lazy_static! {
    static ref EXPRESSION_RE: Regex = Regex::new(r"(?s)\{\{.*?\}\}").unwrap();
    static ref PLACEHOLDER_RE: Regex = Regex::new(PLACEHOLDER_PATTERN).unwrap();
    static ref TAG_NAME_RE: Regex = Regex::new(r"^<([A-Za-z][A-Za-z0-9:-]*)").unwrap();
    static ref ANY_TAG_RE: Regex = Regex::new(
        r#"<(/?)([A-Za-z][A-Za-z0-9:-]*)\b(?:[^>"']|"[^"]*"|'[^']*')*?(/?)>"#
    )
    .unwrap();
    static ref ELEMENT_MARKER_RE: Regex = Regex::new(r"<[A-Za-z]").unwrap();
    static ref CLASS_ATTR_RE: Regex =
        Regex::new(r#"(?i)(?:^|\s)class\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RootKind {
    /// No single root element; several top-level nodes.
    #[default]
    Normal,
    /// Single root element without child elements.
    Single,
    /// Single root element with child elements.
    Container,
}

impl RootKind {
    pub fn has_root(self) -> bool {
        !matches!(self, RootKind::Normal)
    }
}

/// What the analyzer learned about a markup body's root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RootInfo {
    pub kind: RootKind,
    pub tag: Option<String>,
    /// Literal class tokens on the root's opening tag. Expression-bound
    /// classes are not visible here.
    pub classes: Vec<String>,
}

impl RootInfo {
    fn normal() -> Self {
        Self::default()
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.iter().any(|c| c == name)
    }
}

/// Replace every `{{ ... }}` expression with a numbered placeholder.
/// Returns the masked text and the original expressions in order.
pub fn mask_expressions(markup: &str) -> (String, Vec<String>) {
    let mut expressions = Vec::new();
    let masked = EXPRESSION_RE.replace_all(markup, |caps: &regex::Captures| {
        let placeholder = format!("__SCOPED_EXPR_{}__", expressions.len());
        expressions.push(caps[0].to_string());
        placeholder
    });
    (masked.into_owned(), expressions)
}

/// Inverse of [`mask_expressions`].
pub fn unmask_expressions(masked: &str, expressions: &[String]) -> String {
    PLACEHOLDER_RE
        .replace_all(masked, |caps: &regex::Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| expressions.get(i))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

pub fn analyze(markup: &str) -> RootInfo {
    let (masked, _) = mask_expressions(markup);
    let body = masked.trim();

    let Some(name) = TAG_NAME_RE.captures(body) else {
        return RootInfo::normal();
    };
    let tag = name[1].to_string();
    let Some(gt) = open_tag_end(body) else {
        return RootInfo::normal();
    };
    let attrs = &body[name[0].len()..gt];
    if attrs.trim_end().ends_with('/') {
        return RootInfo::normal();
    }
    let open_end = gt + 1;

    let Some(close_start) = closing_tag_start(body, &tag) else {
        return RootInfo::normal();
    };
    if close_start < open_end || !root_closes_at_end(body, &tag) {
        return RootInfo::normal();
    }

    let inner = &body[open_end..close_start];
    let kind = if ELEMENT_MARKER_RE.is_match(inner) {
        RootKind::Container
    } else {
        RootKind::Single
    };

    RootInfo {
        kind,
        tag: Some(tag),
        classes: literal_classes(attrs),
    }
}

/// Index of the `>` ending the tag that opens `masked`. A `>` inside a
/// quoted attribute value does not end the tag. Expressions must already be
/// masked.
pub(crate) fn open_tag_end(masked: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in masked.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '>' => return Some(i),
            None => {}
        }
    }
    None
}

/// Start of a trailing `</tag>` (case-insensitive), if the body ends with one.
fn closing_tag_start(body: &str, tag: &str) -> Option<usize> {
    if !body.ends_with('>') {
        return None;
    }
    let start = body.rfind("</")?;
    let name = body[start + 2..body.len() - 1].trim();
    name.eq_ignore_ascii_case(tag).then_some(start)
}

/// True when the first same-named tag opened is closed by the very last tag
/// of the body, i.e. there is exactly one top-level element.
fn root_closes_at_end(body: &str, tag: &str) -> bool {
    let mut depth: usize = 0;
    for caps in ANY_TAG_RE.captures_iter(body) {
        if !caps[2].eq_ignore_ascii_case(tag) {
            continue;
        }
        let closing = !caps[1].is_empty();
        let self_closing = !caps[3].is_empty();
        if closing {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                let end = caps.get(0).map(|m| m.end()).unwrap_or(0);
                return end == body.len();
            }
        } else if !self_closing {
            depth += 1;
        }
    }
    false
}

fn literal_classes(attrs: &str) -> Vec<String> {
    let Some(caps) = CLASS_ATTR_RE.captures(attrs) else {
        return Vec::new();
    };
    let value = caps
        .get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str())
        .unwrap_or("");
    value
        .split_whitespace()
        .filter(|token| !PLACEHOLDER_RE.is_match(token))
        .map(str::to_string)
        .collect()
}
