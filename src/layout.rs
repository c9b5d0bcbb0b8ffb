//! Page-shell compilation.
//!
//! The shell is a whole document. A style placeholder goes right before
//! `</head>` and a script placeholder right before `</body>`; both anchors are
//! required. Rendered content is yielded through `{{ .Content }}`.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};

pub const HEAD_ANCHOR: &str = "</head>";
pub const BODY_ANCHOR: &str = "</body>";
const STYLE_PLACEHOLDER: &str = "\n\t<style>{{ .CSS }}</style>\n";
const SCRIPT_PLACEHOLDER: &str = "\n\t<script>{{ .JS }}</script>\n";

lazy_static! {
    /// Static component references: `{{ comp "name" ... }}`
    static ref COMPONENT_REF_RE: Regex =
        Regex::new(r#"\{\{-?\s*comp\s+(?:"([^"]+)"|`([^`]+)`)"#).unwrap();
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageShell {
    pub name: String,
    /// Shell markup with both injection placeholders in place.
    pub markup: String,
    /// Components the shell invokes by literal name, in order of appearance.
    pub component_refs: Vec<String>,
}

pub fn compile_shell(name: &str, source: &str) -> Result<PageShell> {
    let mut markup = source.to_string();

    let head = markup.find(HEAD_ANCHOR).ok_or(Error::MissingAnchor {
        anchor: HEAD_ANCHOR,
    })?;
    markup.insert_str(head, STYLE_PLACEHOLDER);

    let body = markup.find(BODY_ANCHOR).ok_or(Error::MissingAnchor {
        anchor: BODY_ANCHOR,
    })?;
    markup.insert_str(body, SCRIPT_PLACEHOLDER);

    let component_refs = static_component_refs(source);
    debug!(shell = name, refs = ?component_refs, "Compiled page shell");

    Ok(PageShell {
        name: name.to_string(),
        markup,
        component_refs,
    })
}

/// Normalize a component reference: `card.html` and `card` name the same component.
pub fn component_name(reference: &str) -> &str {
    reference.strip_suffix(".html").unwrap_or(reference)
}

fn static_component_refs(source: &str) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    for caps in COMPONENT_REF_RE.captures_iter(source) {
        let Some(raw) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let name = component_name(raw.as_str());
        if !refs.iter().any(|r| r == name) {
            refs.push(name.to_string());
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHELL: &str = "<html><head><title>{{.Data.Title}}</title></head><body>{{comp \"nav\"}}{{.Content}}{{ comp `footer.html` 2 }}{{comp \"nav\"}}</body></html>";

    #[test]
    fn test_placeholders_before_anchors() {
        let shell = compile_shell("layout", SHELL).unwrap();
        assert!(shell
            .markup
            .contains("<style>{{ .CSS }}</style>\n</head>"));
        assert!(shell
            .markup
            .contains("<script>{{ .JS }}</script>\n</body>"));
    }

    #[test]
    fn test_static_refs_in_order_without_duplicates() {
        let shell = compile_shell("layout", SHELL).unwrap();
        assert_eq!(shell.component_refs, vec!["nav".to_string(), "footer".to_string()]);
    }

    #[test]
    fn test_missing_head_anchor() {
        let err = compile_shell("layout", "<html><body></body></html>").unwrap_err();
        assert!(matches!(err, Error::MissingAnchor { anchor: "</head>" }));
    }

    #[test]
    fn test_missing_body_anchor() {
        let err = compile_shell("layout", "<html><head></head></html>").unwrap_err();
        assert!(matches!(err, Error::MissingAnchor { anchor: "</body>" }));
        assert_eq!(err.to_string(), "Layout template must contain </body> tag");
    }

    #[test]
    fn test_component_name() {
        assert_eq!(component_name("card.html"), "card");
        assert_eq!(component_name("card"), "card");
    }
}
