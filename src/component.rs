//! Component compilation: blocks in, scoped component out.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::css::scope_styles;
use crate::extract::extract_blocks;
use crate::options::CompileOptions;
use crate::scope::scope_class;
use crate::structure::{
    analyze, mask_expressions, open_tag_end, unmask_expressions, RootInfo, RootKind, PLACEHOLDER_PATTERN,
};

lazy_static! {
    static ref CLASS_ATTR_RE: Regex = Regex::new(&format!(
        r#"(?i)(\s)class\s*=\s*(?:"([^"]*)"|'([^']*)'|({}))"#,
        PLACEHOLDER_PATTERN
    ))
    .unwrap();
}

/// A compiled component. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub name: String,
    /// Markup with the scope class applied, ready for evaluation.
    pub markup: String,
    /// Scoped style text, possibly empty.
    pub style: String,
    /// Script text, verbatim.
    pub script: String,
    pub scope_class: String,
    pub root_kind: RootKind,
}

impl Component {
    pub fn has_markup(&self) -> bool {
        !self.markup.is_empty()
    }
}

/// Compile one component document.
///
/// A document without a markup block is inert: no markup, and its style is
/// kept as written.
pub fn compile_component(name: &str, source: &str, options: &CompileOptions) -> Component {
    let blocks = extract_blocks(source);
    let scope = scope_class(name);
    let unwrap = blocks.unwrap_requested();

    let Some(body) = blocks.markup else {
        debug!(component = name, "No markup block, component is inert");
        return Component {
            name: name.to_string(),
            markup: String::new(),
            style: blocks.style,
            script: blocks.script,
            scope_class: scope,
            root_kind: RootKind::Normal,
        };
    };

    let mut root = analyze(&body);
    let injected = if root.kind.has_root() {
        inject_scope_class(&body, &scope)
    } else {
        None
    };
    let markup = match injected {
        Some(markup) => markup,
        None => {
            if root.kind.has_root() {
                warn!(component = name, "Root tag end not found, wrapping markup instead");
                root = RootInfo::default();
            }
            wrap_markup(&body, &scope, &options.wrapper_tag, unwrap)
        }
    };

    let style = if blocks.style.trim().is_empty() {
        String::new()
    } else {
        scope_styles(&blocks.style, &scope, &root)
    };

    debug!(
        component = name,
        scope_class = %scope,
        root_kind = ?root.kind,
        root_tag = ?root.tag,
        unwrap,
        "Compiled component"
    );

    Component {
        name: name.to_string(),
        markup,
        style,
        script: blocks.script,
        scope_class: scope,
        root_kind: root.kind,
    }
}

/// Wrap rootless markup in a container carrying the scope class. With
/// `unwrap` the container does not generate a box of its own.
pub fn wrap_markup(body: &str, scope: &str, tag: &str, unwrap: bool) -> String {
    if unwrap {
        format!(
            r#"<{tag} class="{scope}" style="display: contents">{body}</{tag}>"#,
            tag = tag,
            scope = scope,
            body = body
        )
    } else {
        format!(r#"<{tag} class="{scope}">{body}</{tag}>"#, tag = tag, scope = scope, body = body)
    }
}

/// Add the scope class to the root element's opening tag. `None` when the
/// body does not open with a complete tag.
pub fn inject_scope_class(body: &str, scope: &str) -> Option<String> {
    let (masked, expressions) = mask_expressions(body);
    let start = masked.len() - masked.trim_start().len();
    if !masked[start..].starts_with('<') {
        return None;
    }
    let end = start + open_tag_end(&masked[start..])?;
    let tag = &masked[start..=end];

    let rewritten = match CLASS_ATTR_RE.captures(tag) {
        Some(caps) => {
            let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            let ws = &caps[1];
            let attr = if let Some(value) = caps.get(2) {
                format!(r#"{}class="{}""#, ws, join_class(scope, value.as_str()))
            } else if let Some(value) = caps.get(3) {
                format!("{}class='{}'", ws, join_class(scope, value.as_str()))
            } else {
                let expr = caps.get(4).map(|m| m.as_str()).unwrap_or("");
                format!(r#"{}class="{} {}""#, ws, scope, expr)
            };
            format!("{}{}{}", &tag[..whole.start], attr, &tag[whole.end..])
        }
        None => {
            let insert_at = if tag.ends_with("/>") {
                tag.len() - 2
            } else {
                tag.len() - 1
            };
            let head = tag[..insert_at].trim_end();
            format!(r#"{} class="{}"{}"#, head, scope, &tag[insert_at..])
        }
    };

    let masked = format!("{}{}{}", &masked[..start], rewritten, &masked[end + 1..]);
    Some(unmask_expressions(&masked, &expressions))
}

fn join_class(scope: &str, existing: &str) -> String {
    if existing.trim().is_empty() {
        scope.to_string()
    } else {
        format!("{} {}", scope, existing)
    }
}
