//! # Scoped Component Compiler
//!
//! Compiles single-file components (`<template>`, `<style>`, `<script>`)
//! into markup whose styles cannot leak, and renders them into a page shell
//! with only the styles and scripts of the components a page actually used.
//!
//! ## Pipeline
//!
//! 1. **Extraction**: the first markup, style and script block of a document.
//! 2. **Structure analysis**: expressions are masked, then the markup is
//!    classified as having no root, a single childless root, or a container
//!    root.
//! 3. **Scoping**: a scope class derived from the component name is added to
//!    the root (or to a synthetic wrapper) and every style selector is
//!    rewritten against it.
//! 4. **Composition**: at render time `comp` renders nested components, each
//!    with its own call frame; every component reached is recorded.
//! 5. **Shell injection**: the aggregated styles and scripts are written
//!    before `</head>` and `</body>` of the page shell.
//!
//! ## Example
//!
//! ```no_run
//! use scoped_compiler::{load_dir, Registry};
//! use serde_json::json;
//!
//! let registry = Registry::default();
//! let report = load_dir(&registry, "templates")?;
//! assert!(report.is_clean());
//! let page = registry.render("index", &json!({ "title": "Home" }))?;
//! # Ok::<(), scoped_compiler::Error>(())
//! ```

mod cache;
mod component;
mod css;
mod discovery;
mod error;
mod extract;
mod funcs;
mod layout;
mod options;
mod registry;
mod runtime;
mod scope;
mod structure;
mod template;
mod value;

#[cfg(test)]
mod runtime_tests;

pub use component::{compile_component, inject_scope_class, wrap_markup, Component};
pub use css::scope_styles;
pub use discovery::{load_dir, load_dirs, load_sources, LoadReport};
pub use error::{Error, Result};
pub use extract::{extract_blocks, extract_markup_or_whole, Blocks};
pub use funcs::{default_funcs, dict, func, Func, FuncMap};
pub use layout::{compile_shell, component_name, PageShell, BODY_ANCHOR, HEAD_ANCHOR};
pub use options::CompileOptions;
pub use registry::Registry;
pub use runtime::{Assets, CallFrame, RenderSession, Rendered};
pub use scope::{scope_class, SCOPE_PREFIX};
pub use structure::{analyze, RootInfo, RootKind};
pub use template::{escape_html, FuncHost, NoFuncs, Template};
pub use value::Value;
