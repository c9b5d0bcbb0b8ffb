//! Selector scoping for component style blocks.
//!
//! Works at rule-block and selector-list granularity only. Each rule's
//! selector list is split on commas and every selector is rewritten on its
//! own. For a markup block with a root element, the first matching policy wins:
//!
//! | selector            | rewrite                                   |
//! |---------------------|-------------------------------------------|
//! | root tag (`button`) | `button.s-xxxxxx`                         |
//! | `.name`             | `.s-xxxxxx.name` when the root is Single or carries `name`, else `.s-xxxxxx .name` |
//! | `:pseudo`           | `tag.s-xxxxxx:pseudo` (or `.s-xxxxxx:pseudo` without a tag) |
//! | anything else       | `.s-xxxxxx selector`                      |
//!
//! Markup without a root element is wrapped in a container carrying the scope
//! class, so every selector becomes a descendant selector.

use lazy_static::lazy_static;
use regex::Regex;

use crate::structure::{RootInfo, RootKind};

lazy_static! {
    static ref COMMENT_RE: Regex = Regex::new(r"(?s)/\*.*?\*/").unwrap();
    static ref SIMPLE_CLASS_RE: Regex = Regex::new(r"^\.(-?[_a-zA-Z][_a-zA-Z0-9-]*)$").unwrap();
    static ref GROUPING_AT_RULE_RE: Regex =
        Regex::new(r"(?i)^@(media|supports|container|layer|document)\b").unwrap();
}

/// Rewrite a style block so it only applies inside the component carrying `scope_class`.
pub fn scope_styles(css: &str, scope_class: &str, root: &RootInfo) -> String {
    let css = COMMENT_RE.replace_all(css, "");
    scope_rules(&css, scope_class, root)
}

enum CssItem<'a> {
    Rule { prelude: &'a str, body: &'a str },
    Raw(&'a str),
}

fn scope_rules(css: &str, scope_class: &str, root: &RootInfo) -> String {
    let mut out = Vec::new();

    for item in split_rules(css) {
        match item {
            CssItem::Raw(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    out.push(text.to_string());
                }
            }
            CssItem::Rule { prelude, body } => {
                // Statement at-rules (`@import ...;`) end up in front of the next prelude.
                let (statements, prelude) = match prelude.rfind(';') {
                    Some(pos) => (prelude[..=pos].trim(), prelude[pos + 1..].trim()),
                    None => ("", prelude.trim()),
                };
                if !statements.is_empty() {
                    out.push(statements.to_string());
                }

                if prelude.starts_with('@') {
                    let inner = if GROUPING_AT_RULE_RE.is_match(prelude) {
                        scope_rules(body, scope_class, root)
                    } else {
                        body.to_string()
                    };
                    out.push(format!("{}{{{}}}", prelude, inner));
                    continue;
                }

                let selectors: Vec<String> = prelude
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| scope_selector(s, scope_class, root))
                    .collect();
                out.push(format!("{}{{{}}}", selectors.join(", "), body));
            }
        }
    }

    out.join("\n")
}

/// Split style text into top-level rules, keeping nested blocks intact.
fn split_rules(css: &str) -> Vec<CssItem<'_>> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut prelude_end = 0;

    for (i, c) in css.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    prelude_end = i;
                }
                depth += 1;
            }
            '}' => {
                if depth == 0 {
                    items.push(CssItem::Raw(&css[start..i]));
                    start = i + 1;
                    continue;
                }
                depth -= 1;
                if depth == 0 {
                    items.push(CssItem::Rule {
                        prelude: &css[start..prelude_end],
                        body: &css[prelude_end + 1..i],
                    });
                    start = i + 1;
                }
            }
            _ => {}
        }
    }

    if start < css.len() {
        if depth > 0 {
            // Unterminated rule: treat the remainder as its body.
            items.push(CssItem::Rule {
                prelude: &css[start..prelude_end],
                body: &css[prelude_end + 1..],
            });
        } else {
            items.push(CssItem::Raw(&css[start..]));
        }
    }

    items
}

fn scope_selector(selector: &str, scope_class: &str, root: &RootInfo) -> String {
    if root.kind == RootKind::Normal {
        return format!(".{} {}", scope_class, selector);
    }

    let tag = root.tag.as_deref();

    if tag.is_some_and(|t| t.eq_ignore_ascii_case(selector)) {
        return format!("{}.{}", selector, scope_class);
    }

    if let Some(caps) = SIMPLE_CLASS_RE.captures(selector) {
        let name = &caps[1];
        return if root.kind == RootKind::Single || root.has_class(name) {
            format!(".{}{}", scope_class, selector)
        } else {
            format!(".{} {}", scope_class, selector)
        };
    }

    if selector.starts_with(':') {
        return match tag {
            Some(tag) => format!("{}.{}{}", tag, scope_class, selector),
            None => format!(".{}{}", scope_class, selector),
        };
    }

    format!(".{} {}", scope_class, selector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn root(kind: RootKind, tag: &str, classes: &[&str]) -> RootInfo {
        RootInfo {
            kind,
            tag: Some(tag.to_string()),
            classes: classes.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_single_root_tag_and_class() {
        let r = root(RootKind::Single, "button", &[]);
        let out = scope_styles("button{color:red}.primary{color:blue}", "s-abc123", &r);
        assert_eq!(out, "button.s-abc123{color:red}\n.s-abc123.primary{color:blue}");
    }

    #[test]
    fn test_container_root_class_vs_descendant() {
        let r = root(RootKind::Container, "div", &["card"]);
        let out = scope_styles(".card{border:1px}.title{font-weight:bold}", "s-xyz987", &r);
        assert_eq!(out, ".s-xyz987.card{border:1px}\n.s-xyz987 .title{font-weight:bold}");
    }

    #[test]
    fn test_compound_selector_prefixed_whole() {
        for kind in [RootKind::Single, RootKind::Container, RootKind::Normal] {
            let r = root(kind, "div", &["card"]);
            let out = scope_styles(".card h3{margin:0}", "s-xyz987", &r);
            assert_eq!(out, ".s-xyz987 .card h3{margin:0}");
        }
    }

    #[test]
    fn test_combinators_are_descendant_scoped() {
        let r = root(RootKind::Container, "ul", &[]);
        let out = scope_styles("ul > li{a:b} li + li{c:d} li ~ p{e:f}", "s-1", &r);
        assert_eq!(out, ".s-1 ul > li{a:b}\n.s-1 li + li{c:d}\n.s-1 li ~ p{e:f}");
    }

    #[test]
    fn test_pseudo_class() {
        let r = root(RootKind::Single, "a", &[]);
        assert_eq!(scope_styles(":hover{x:y}", "s-1", &r), "a.s-1:hover{x:y}");

        let tagless = RootInfo {
            kind: RootKind::Single,
            tag: None,
            classes: vec![],
        };
        assert_eq!(scope_styles(":hover{x:y}", "s-1", &tagless), ".s-1:hover{x:y}");
    }

    #[test]
    fn test_attribute_and_id_selectors_fall_back_to_descendant() {
        // Top-level attribute selectors are treated like any other simple selector.
        let r = root(RootKind::Single, "button", &[]);
        let out = scope_styles("[disabled]{opacity:.5}#main{x:y}", "s-1", &r);
        assert_eq!(out, ".s-1 [disabled]{opacity:.5}\n.s-1 #main{x:y}");
    }

    #[test]
    fn test_rootless_scopes_everything_as_descendant() {
        let r = RootInfo::default();
        let out = scope_styles("b{font-weight:bold}.x{y:z}", "s-token", &r);
        assert_eq!(out, ".s-token b{font-weight:bold}\n.s-token .x{y:z}");
    }

    #[test]
    fn test_selector_list_is_rejoined() {
        let r = root(RootKind::Container, "nav", &["menu"]);
        let out = scope_styles("nav , .menu,.item  {gap: 1rem;}", "s-9", &r);
        assert_eq!(out, "nav.s-9, .s-9.menu, .s-9 .item{gap: 1rem;}");
    }

    #[test]
    fn test_media_rules_scoped_inside() {
        let r = root(RootKind::Container, "div", &[]);
        let css = "@media (max-width: 600px) { .a { color: red; } }\n@keyframes spin { from { x: 0 } to { x: 1 } }";
        let out = scope_styles(css, "s-1", &r);
        assert_eq!(
            out,
            "@media (max-width: 600px){.s-1 .a{ color: red; }}\n@keyframes spin{ from { x: 0 } to { x: 1 } }"
        );
    }

    #[test]
    fn test_comments_and_imports() {
        let r = root(RootKind::Container, "div", &[]);
        let out = scope_styles("@import url(a.css);\n/* hi, there */ p { m: 0 }", "s-1", &r);
        assert_eq!(out, "@import url(a.css);\n.s-1 p{ m: 0 }");
    }

    #[test]
    fn test_empty_css() {
        assert_eq!(scope_styles("  \n ", "s-1", &RootInfo::default()), "");
    }
}
