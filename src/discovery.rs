//! Bulk loading.
//!
//! Loads component documents into a [`Registry`], either from directories
//! on disk or from an in-memory set of named sources (embedded assets, for
//! instance). The document whose stem matches the configured shell name
//! becomes the page shell.

use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

use crate::component::{compile_component, Component};
use crate::error::{Error, Result};
use crate::options::CompileOptions;
use crate::registry::Registry;

/// Outcome of a bulk load.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Names of the components registered, in discovery order.
    pub loaded: Vec<String>,
    /// Documents that could not be read or compiled, by path (or by the name
    /// given for in-memory sources). Siblings still load.
    pub failed: Vec<(PathBuf, Error)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// One document awaiting compilation.
struct Document {
    origin: PathBuf,
    name: String,
    source: Result<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════════

/// Candidate documents directly inside `dir`, sorted by path.
fn find_documents(dir: &Path, options: &CompileOptions) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = entry.map_err(|e| Error::Source {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let accepted = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| options.accepts_extension(ext));
        if accepted {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

fn document_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_document(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| Error::Source {
        path: path.to_path_buf(),
        source,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// BULK LOAD
// ═══════════════════════════════════════════════════════════════════════════════

/// Load a single directory. See [`load_dirs`].
pub fn load_dir(registry: &Registry, dir: impl AsRef<Path>) -> Result<LoadReport> {
    load_dirs(registry, &[dir.as_ref()])
}

/// Load every accepted document directly inside `dirs`.
///
/// Documents are read and compiled in parallel, then registered. A document
/// that cannot be read or whose markup does not parse is reported in
/// [`LoadReport::failed`]. An unreadable directory, a broken page shell, or a
/// missing page shell fails the whole load.
#[instrument(skip(registry, dirs), fields(dirs = dirs.len()))]
pub fn load_dirs<P: AsRef<Path>>(registry: &Registry, dirs: &[P]) -> Result<LoadReport> {
    let mut paths = Vec::new();
    for dir in dirs {
        paths.extend(find_documents(dir.as_ref(), registry.options())?);
    }

    let documents = paths
        .into_par_iter()
        .map(|path| Document {
            name: document_name(&path),
            source: read_document(&path),
            origin: path,
        })
        .collect();

    load_documents(registry, documents)
}

/// Load documents that are already in memory, as `(name, source)` pairs.
///
/// A name may be a bare logical name (`card`) or a file name or path
/// (`components/card.html`); the stem is the logical name. Names with an
/// extension outside [`CompileOptions::extensions`] are skipped. Shell
/// routing and failure reporting are the same as for [`load_dirs`].
#[instrument(skip_all)]
pub fn load_sources<I, N, S>(registry: &Registry, sources: I) -> Result<LoadReport>
where
    I: IntoIterator<Item = (N, S)>,
    N: AsRef<str>,
    S: Into<String>,
{
    let options = registry.options();
    let documents = sources
        .into_iter()
        .filter_map(|(name, source)| {
            let origin = PathBuf::from(name.as_ref());
            let accepted = origin
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(true, |ext| options.accepts_extension(ext));
            accepted.then(|| Document {
                name: document_name(&origin),
                source: Ok(source.into()),
                origin,
            })
        })
        .collect();

    load_documents(registry, documents)
}

fn load_documents(registry: &Registry, documents: Vec<Document>) -> Result<LoadReport> {
    let options = registry.options();
    let (shells, components): (Vec<Document>, Vec<Document>) = documents
        .into_iter()
        .partition(|doc| doc.name == options.shell_name);

    let compiled: Vec<(PathBuf, Result<Component>)> = components
        .into_par_iter()
        .map(|Document { origin, name, source }| {
            let result = source.map(|source| compile_component(&name, &source, options));
            (origin, result)
        })
        .collect();

    let mut report = LoadReport::default();
    for (origin, result) in compiled {
        let registered = result.and_then(|component| {
            let name = component.name.clone();
            registry.register(component).map(|_| name)
        });
        match registered {
            Ok(name) => report.loaded.push(name),
            Err(e) => {
                warn!(document = %origin.display(), error = %e, "Failed to load component");
                report.failed.push((origin, e));
            }
        }
    }

    // The last shell found wins, like any other document name.
    let shell = shells.into_iter().last().ok_or_else(|| Error::ShellNotFound {
        name: options.shell_name.clone(),
    })?;
    let source = shell.source?;
    registry.compile_shell(&options.shell_name, &source)?;

    info!(
        loaded = report.loaded.len(),
        failed = report.failed.len(),
        shell = %shell.origin.display(),
        "Loaded component documents"
    );
    Ok(report)
}
