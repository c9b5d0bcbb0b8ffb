//! Composition runtime.
//!
//! Every top-level render owns a [`RenderSession`]: the call stack read by
//! `param`/`paramOr` and the set of components whose styles and scripts end
//! up in the page. Nothing here is shared between renders, so concurrent
//! renders against one [`Registry`] never observe each other.

use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::funcs::dict;
use crate::layout::component_name;
use crate::registry::Registry;
use crate::template::FuncHost;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    pub name: String,
    /// Positional arguments as passed by the caller.
    pub args: Vec<Value>,
}

#[derive(Debug, Default)]
struct UsedSet {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl UsedSet {
    fn insert(&mut self, name: &str) -> bool {
        if self.seen.insert(name.to_string()) {
            self.order.push(name.to_string());
            true
        } else {
            false
        }
    }
}

/// Styles and scripts of every component reached by a render.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Assets {
    pub css: String,
    pub js: String,
}

/// A fragment render: markup plus the assets it needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rendered {
    pub html: String,
    pub assets: Assets,
    /// Components reached, in first-use order.
    pub used: Vec<String>,
}

pub struct RenderSession<'r> {
    registry: &'r Registry,
    stack: Mutex<Vec<CallFrame>>,
    used: Mutex<UsedSet>,
}

/// Pops the frame it was created for, on success and on failure alike.
struct FrameGuard<'s> {
    stack: &'s Mutex<Vec<CallFrame>>,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut stack) = self.stack.lock() {
            stack.pop();
        }
    }
}

impl<'r> RenderSession<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            stack: Mutex::new(Vec::new()),
            used: Mutex::new(UsedSet::default()),
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.lock().expect("Call stack poisoned").len()
    }

    pub fn used_components(&self) -> Vec<String> {
        self.used.lock().expect("Used set poisoned").order.clone()
    }

    pub fn mark_used(&self, name: &str) {
        let name = component_name(name);
        if self.used.lock().expect("Used set poisoned").insert(name) {
            debug!(component = name, "Marked component as used");
        }
    }

    fn push_frame(&self, frame: CallFrame) -> FrameGuard<'_> {
        self.stack.lock().expect("Call stack poisoned").push(frame);
        FrameGuard { stack: &self.stack }
    }

    /// Positional argument `index` of the innermost invocation, nil when absent.
    pub fn param(&self, index: i64) -> Value {
        let stack = self.stack.lock().expect("Call stack poisoned");
        stack
            .last()
            .and_then(|frame| usize::try_from(index).ok().and_then(|i| frame.args.get(i)))
            .cloned()
            .unwrap_or_default()
    }

    /// Like [`param`](Self::param), falling back to `default` when the
    /// argument is absent or nil.
    pub fn param_or(&self, index: i64, default: Value) -> Value {
        match self.param(index) {
            Value::Null => default,
            value => value,
        }
    }

    /// Render a nested component. A single mapping argument becomes the
    /// callee's data as is; any other arguments are exposed under `"0"`,
    /// `"1"`, ...
    pub fn invoke_component(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        let name = component_name(name);
        let entry = self
            .registry
            .entry(name)
            .ok_or_else(|| Error::ComponentNotFound {
                name: name.to_string(),
            })?;

        let depth = self.depth();
        let max_depth = self.registry.options().max_depth;
        if depth >= max_depth {
            warn!(component = name, depth, "Nested invocation limit reached");
            return Err(Error::RecursionLimit {
                name: name.to_string(),
                depth: max_depth,
            });
        }

        let data = match args.as_slice() {
            [single @ Value::Map(_)] => single.clone(),
            _ => Value::map(
                args.iter()
                    .enumerate()
                    .map(|(i, arg)| (i.to_string(), arg.clone())),
            ),
        };

        self.mark_used(name);
        let _frame = self.push_frame(CallFrame {
            name: name.to_string(),
            args,
        });
        debug!(component = name, depth = depth + 1, "Invoking component");

        let html = entry.template.execute(&data, self)?;
        Ok(Value::Html(html))
    }

    /// Concatenated styles and scripts of every used component, in first-use order.
    pub fn assets(&self) -> Assets {
        let mut assets = Assets::default();
        for name in self.used_components() {
            let Some(component) = self.registry.lookup(&name) else {
                continue;
            };
            if !component.style.is_empty() {
                assets.css.push_str(&component.style);
                assets.css.push('\n');
            }
            if !component.script.is_empty() {
                assets.js.push_str(&component.script);
                assets.js.push('\n');
            }
        }
        assets
    }

    fn runtime_call(&self, name: &str, args: &[Value]) -> Option<Result<Value>> {
        let result = match name {
            "comp" => match args.split_first() {
                Some((Value::Str(target), rest)) => self.invoke_component(target, rest.to_vec()),
                _ => Err(Error::function(name, "expected a component name")),
            },
            "param" => index_arg(name, args).map(|i| self.param(i)),
            "paramOr" => index_arg(name, args).and_then(|i| {
                args.get(1)
                    .cloned()
                    .map(|default| self.param_or(i, default))
                    .ok_or_else(|| Error::function(name, "missing default value"))
            }),
            "dict" => dict(args),
            _ => return None,
        };
        Some(result)
    }
}

fn index_arg(name: &str, args: &[Value]) -> Result<i64> {
    args.first()
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::function(name, "expected an integer index"))
}

impl FuncHost for RenderSession<'_> {
    fn call(&self, name: &str, args: &[Value]) -> Option<Result<Value>> {
        self.runtime_call(name, args)
            .or_else(|| self.registry.call_func(name, args))
    }
}

/// Function host for isolated renders: helpers only, no composition.
struct IsolatedHost<'r> {
    registry: &'r Registry,
}

impl FuncHost for IsolatedHost<'_> {
    fn call(&self, name: &str, args: &[Value]) -> Option<Result<Value>> {
        if name == "dict" {
            return Some(dict(args));
        }
        self.registry.call_func(name, args)
    }
}

impl Registry {
    /// Render a full page: the entry component inside the page shell, with
    /// the styles and scripts of every component reached.
    #[instrument(skip(self, data))]
    pub fn render<T: Serialize + ?Sized>(&self, name: &str, data: &T) -> Result<String> {
        let entry = self.entry(name).ok_or_else(|| Error::ComponentNotFound {
            name: name.to_string(),
        })?;
        let shell = self.shell_entry().ok_or(Error::NoShell)?;
        let data = Value::from_serialize(data)?;

        let session = RenderSession::new(self);
        session.mark_used(&entry.component.name);
        for reference in &shell.shell.component_refs {
            session.mark_used(reference);
        }

        let content = entry.template.execute(&data, &session)?;
        let assets = session.assets();
        let page_data = Value::map([
            ("Content", Value::Html(content)),
            ("CSS", Value::Html(assets.css)),
            ("JS", Value::Html(assets.js)),
            ("Data", data),
        ]);
        let html = shell.template.execute(&page_data, &session)?;

        info!(
            entry = %entry.component.name,
            used = session.used_components().len(),
            bytes = html.len(),
            "Rendered page"
        );
        Ok(html)
    }

    /// Render the entry component alone, without the page shell.
    #[instrument(skip(self, data))]
    pub fn render_fragment<T: Serialize + ?Sized>(&self, name: &str, data: &T) -> Result<Rendered> {
        let entry = self.entry(name).ok_or_else(|| Error::ComponentNotFound {
            name: name.to_string(),
        })?;
        let data = Value::from_serialize(data)?;

        let session = RenderSession::new(self);
        session.mark_used(&entry.component.name);
        let html = entry.template.execute(&data, &session)?;

        Ok(Rendered {
            html,
            assets: session.assets(),
            used: session.used_components(),
        })
    }

    /// Render a document straight from disk, without the page shell and
    /// without registering it.
    pub fn render_isolated<T: Serialize + ?Sized>(&self, path: impl AsRef<Path>, data: &T) -> Result<String> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| Error::Source {
            path: path.to_path_buf(),
            source,
        })?;
        self.render_isolated_source(&path.to_string_lossy(), &source, data)
    }

    /// Render a document's markup block (or the whole document when it has
    /// none). The parsed markup is cached under `id` until `source` changes.
    #[instrument(skip(self, source, data))]
    pub fn render_isolated_source<T: Serialize + ?Sized>(&self, id: &str, source: &str, data: &T) -> Result<String> {
        let name = Path::new(id)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.to_string());
        let template = self.isolated.get_or_compile(id, &name, source)?;
        let data = Value::from_serialize(data)?;
        template.execute(&data, &IsolatedHost { registry: self })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_outside_invocation_is_nil() {
        let registry = Registry::default();
        let session = RenderSession::new(&registry);
        assert_eq!(session.param(0), Value::Null);
        assert_eq!(session.param_or(0, Value::Int(7)), Value::Int(7));
    }

    #[test]
    fn test_frame_guard_pops_on_drop() {
        let registry = Registry::default();
        let session = RenderSession::new(&registry);
        {
            let _frame = session.push_frame(CallFrame {
                name: "a".into(),
                args: vec![Value::Int(1), Value::Null],
            });
            assert_eq!(session.depth(), 1);
            assert_eq!(session.param(0), Value::Int(1));
            assert_eq!(session.param(-1), Value::Null);
            assert_eq!(session.param_or(1, "d".into()), Value::Str("d".into()));
            assert_eq!(session.param_or(5, "d".into()), Value::Str("d".into()));
        }
        assert_eq!(session.depth(), 0);
    }

    #[test]
    fn test_used_set_keeps_first_use_order() {
        let registry = Registry::default();
        let session = RenderSession::new(&registry);
        session.mark_used("b");
        session.mark_used("a.html");
        session.mark_used("b");
        assert_eq!(session.used_components(), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_argument_normalization() {
        let registry = Registry::default();
        registry
            .compile("show", "<template><i>{{.name}}|{{index . \"0\"}}|{{index . \"1\"}}</i></template>")
            .unwrap();
        let session = RenderSession::new(&registry);
        let scope = registry.lookup("show").unwrap().scope_class;

        let named = Value::map([("name", Value::from("n"))]);
        let out = session.invoke_component("show", vec![named]).unwrap();
        assert_eq!(out, Value::Html(format!("<i class=\"{}\">n||</i>", scope)));

        let out = session
            .invoke_component("show.html", vec!["a".into(), "b".into()])
            .unwrap();
        assert_eq!(out, Value::Html(format!("<i class=\"{}\">|a|b</i>", scope)));
        assert_eq!(session.depth(), 0);
    }
}
