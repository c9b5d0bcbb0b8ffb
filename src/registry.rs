//! Shared component registry.
//!
//! Populated once during a bulk-load phase, then read concurrently by any
//! number of renders. Each compiled component is stored next to its parsed
//! markup so a render never re-parses.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, instrument, warn};

use crate::cache::IsolatedCache;
use crate::component::{compile_component, Component};
use crate::error::{Error, Result};
use crate::funcs::{default_funcs, FuncMap, RESERVED_NAMES};
use crate::layout::{compile_shell, component_name, PageShell};
use crate::options::CompileOptions;
use crate::template::Template;
use crate::value::Value;

pub(crate) struct Entry {
    pub(crate) component: Component,
    pub(crate) template: Template,
}

pub(crate) struct ShellEntry {
    pub(crate) shell: PageShell,
    pub(crate) template: Template,
}

pub struct Registry {
    options: CompileOptions,
    components: RwLock<HashMap<String, Arc<Entry>>>,
    shell: RwLock<Option<Arc<ShellEntry>>>,
    funcs: RwLock<FuncMap>,
    pub(crate) isolated: IsolatedCache,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

impl Registry {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            components: RwLock::new(HashMap::new()),
            shell: RwLock::new(None),
            funcs: RwLock::new(default_funcs()),
            isolated: IsolatedCache::new(),
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Make host functions available to component and shell markup.
    /// Runtime function names are skipped.
    pub fn add_funcs(&self, funcs: FuncMap) {
        let mut map = self.funcs.write().expect("Function map poisoned");
        for (name, f) in funcs {
            if RESERVED_NAMES.contains(&name.as_str()) {
                warn!(function = %name, "Ignoring custom function that shadows a runtime function");
                continue;
            }
            map.insert(name, f);
        }
    }

    /// Compile a component document and register it.
    #[instrument(skip(self, source))]
    pub fn compile(&self, name: &str, source: &str) -> Result<Component> {
        let component = compile_component(name, source, &self.options);
        self.register(component.clone())?;
        Ok(component)
    }

    /// Register a compiled component. The last registration for a name wins.
    pub fn register(&self, component: Component) -> Result<()> {
        let template = Template::parse(&component.name, &component.markup)?;
        let name = component.name.clone();
        let mut map = self.components.write().expect("Component registry poisoned");
        if map
            .insert(name.clone(), Arc::new(Entry { component, template }))
            .is_some()
        {
            debug!(component = %name, "Replaced registered component");
        }
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Component> {
        self.entry(name).map(|entry| entry.component.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        let map = self.components.read().expect("Component registry poisoned");
        map.contains_key(component_name(name))
    }

    /// Registered component names, sorted.
    pub fn names(&self) -> Vec<String> {
        let map = self.components.read().expect("Component registry poisoned");
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.components.read().expect("Component registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Install an already compiled page shell.
    pub fn set_shell(&self, shell: PageShell) -> Result<()> {
        let template = Template::parse(&shell.name, &shell.markup)?;
        let mut slot = self.shell.write().expect("Shell slot poisoned");
        *slot = Some(Arc::new(ShellEntry { shell, template }));
        Ok(())
    }

    /// Compile a page-shell document and install it.
    #[instrument(skip(self, source))]
    pub fn compile_shell(&self, name: &str, source: &str) -> Result<PageShell> {
        let shell = compile_shell(name, source)?;
        self.set_shell(shell.clone())?;
        Ok(shell)
    }

    pub fn shell(&self) -> Option<PageShell> {
        self.shell_entry().map(|entry| entry.shell.clone())
    }

    pub(crate) fn entry(&self, name: &str) -> Option<Arc<Entry>> {
        let map = self.components.read().expect("Component registry poisoned");
        map.get(component_name(name)).cloned()
    }

    pub(crate) fn shell_entry(&self) -> Option<Arc<ShellEntry>> {
        self.shell.read().expect("Shell slot poisoned").clone()
    }

    /// Call a registered helper. `None` when no helper has that name.
    pub(crate) fn call_func(&self, name: &str, args: &[Value]) -> Option<Result<Value>> {
        let f = {
            let map = self.funcs.read().expect("Function map poisoned");
            map.get(name).cloned()
        }?;
        Some(f(args).map_err(|message| Error::function(name, message)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funcs::func;

    #[test]
    fn test_register_and_lookup() {
        let registry = Registry::default();
        registry.compile("card", "<template><div>x</div></template>").unwrap();
        assert!(registry.contains("card"));
        assert!(registry.contains("card.html"));
        assert_eq!(registry.lookup("card.html").unwrap().name, "card");
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let registry = Registry::default();
        registry.compile("a", "<template><p>one</p></template>").unwrap();
        registry.compile("a", "<template><p>two</p></template>").unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup("a").unwrap().markup.contains("two"));
    }

    #[test]
    fn test_bad_markup_is_not_registered() {
        let registry = Registry::default();
        assert!(registry.compile("broken", "<template><p>{{if .x}}</p></template>").is_err());
        assert!(!registry.contains("broken"));
    }

    #[test]
    fn test_shell_install() {
        let registry = Registry::default();
        assert!(registry.shell().is_none());
        assert!(registry.compile_shell("layout", "<html><body></body></html>").is_err());
        registry
            .compile_shell("layout", "<html><head></head><body>{{.Content}}</body></html>")
            .unwrap();
        assert_eq!(registry.shell().unwrap().name, "layout");
    }

    #[test]
    fn test_custom_funcs_cannot_shadow_runtime() {
        let registry = Registry::default();
        let mut funcs = FuncMap::new();
        funcs.insert("comp".to_string(), func(|_| Ok(Value::Null)));
        funcs.insert("shout".to_string(), func(|args| Ok(Value::Str(args[0].to_text().to_uppercase()))));
        registry.add_funcs(funcs);

        assert!(registry.call_func("comp", &[]).is_none());
        let out = registry.call_func("shout", &["hi".into()]).unwrap().unwrap();
        assert_eq!(out, Value::Str("HI".into()));
    }

    #[test]
    fn test_names_sorted() {
        let registry = Registry::default();
        registry.compile("b", "<template><i/></template>").unwrap();
        registry.compile("a", "<template><i/></template>").unwrap();
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }
}
