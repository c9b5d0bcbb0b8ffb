//! Block extraction for component documents.
//!
//! A component document carries up to three blocks:
//!
//! ```text
//! <template unwrap> ... </template>
//! <style> ... </style>
//! <script> ... </script>
//! ```
//!
//! Only the first block of each kind is honoured. Style and script blocks are
//! looked up outside the markup block so that inline tags inside the markup
//! stay part of the markup.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref TEMPLATE_REGEX: Regex =
        Regex::new(r"(?is)<template\b([^>]*)>(.*?)</template\s*>").unwrap();
    static ref STYLE_REGEX: Regex = Regex::new(r"(?is)<style\b[^>]*>(.*?)</style\s*>").unwrap();
    static ref SCRIPT_REGEX: Regex =
        Regex::new(r"(?is)<script\b[^>]*>(.*?)</script\s*>").unwrap();

    /// Attribute regex for the markup block's opening tag
    static ref ATTR_REGEX: Regex =
        Regex::new(r#"(?i)([a-z0-9_:-]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^>\s]+)))?"#).unwrap();
}

/// Attribute on the markup block that asks for a non-rendering wrapper.
pub const UNWRAP_ATTR: &str = "unwrap";

/// The raw blocks of one component document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blocks {
    /// Body of the markup block, `None` when the document has none.
    pub markup: Option<String>,
    /// Attributes on the markup block's opening tag. Bare attributes map to `"true"`.
    pub markup_attrs: HashMap<String, String>,
    pub style: String,
    pub script: String,
}

impl Blocks {
    pub fn unwrap_requested(&self) -> bool {
        self.markup_attrs
            .get(UNWRAP_ATTR)
            .map(|v| v != "false")
            .unwrap_or(false)
    }
}

/// Split a component document into its markup, style and script blocks.
pub fn extract_blocks(source: &str) -> Blocks {
    let mut blocks = Blocks::default();

    let rest = match TEMPLATE_REGEX.captures(source) {
        Some(caps) => {
            let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            blocks.markup_attrs = parse_attributes(attrs);
            blocks.markup = caps.get(2).map(|m| m.as_str().to_string());

            let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            let mut rest = String::with_capacity(source.len() - whole.len());
            rest.push_str(&source[..whole.start]);
            rest.push_str(&source[whole.end..]);
            rest
        }
        None => source.to_string(),
    };

    if let Some(caps) = STYLE_REGEX.captures(&rest) {
        blocks.style = caps[1].to_string();
    }
    if let Some(caps) = SCRIPT_REGEX.captures(&rest) {
        blocks.script = caps[1].to_string();
    }

    blocks
}

/// Markup for the isolated render path: the markup block when present,
/// otherwise the whole document.
pub fn extract_markup_or_whole(source: &str) -> String {
    TEMPLATE_REGEX
        .captures(source)
        .map(|caps| caps[2].to_string())
        .unwrap_or_else(|| source.to_string())
}

fn parse_attributes(attr_string: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    for attr_caps in ATTR_REGEX.captures_iter(attr_string) {
        if let Some(name) = attr_caps.get(1) {
            let value = attr_caps
                .get(2)
                .or_else(|| attr_caps.get(3))
                .or_else(|| attr_caps.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "true".to_string());
            attributes.insert(name.as_str().to_lowercase(), value);
        }
    }
    attributes
}
