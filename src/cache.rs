use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::extract::extract_markup_or_whole;
use crate::template::Template;

pub struct CachedTemplate {
    pub hash: String,
    pub template: Arc<Template>,
}

/// Parsed isolated-render templates keyed by document identity. An entry is
/// reused only while the document's content hash is unchanged.
#[derive(Default)]
pub struct IsolatedCache {
    entries: DashMap<String, CachedTemplate>,
}

impl IsolatedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute_hash(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, id: &str, source: &str) -> Option<Arc<Template>> {
        let entry = self.entries.get(id)?;
        if entry.hash == Self::compute_hash(source) {
            Some(entry.template.clone())
        } else {
            None
        }
    }

    pub fn set(&self, id: &str, source: &str, template: Arc<Template>) {
        let hash = Self::compute_hash(source);
        self.entries
            .insert(id.to_string(), CachedTemplate { hash, template });
    }

    /// Cached template for `id`, parsing the markup block of `source` on a miss.
    pub fn get_or_compile(&self, id: &str, name: &str, source: &str) -> Result<Arc<Template>> {
        if let Some(template) = self.get(id, source) {
            return Ok(template);
        }
        debug!(document = id, "Isolated cache miss, compiling");
        let markup = extract_markup_or_whole(source);
        let template = Arc::new(Template::parse(&format!("{}_isolated", name), &markup)?);
        self.set(id, source, template.clone());
        Ok(template)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_and_invalidate() {
        let cache = IsolatedCache::new();
        let a = cache.get_or_compile("a.html", "a", "<template>{{.}}</template>").unwrap();
        let again = cache.get_or_compile("a.html", "a", "<template>{{.}}</template>").unwrap();
        assert!(Arc::ptr_eq(&a, &again));

        let changed = cache.get_or_compile("a.html", "a", "<p>{{.}}</p>").unwrap();
        assert!(!Arc::ptr_eq(&a, &changed));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_parse_error_is_not_cached() {
        let cache = IsolatedCache::new();
        assert!(cache.get_or_compile("bad", "bad", "{{if .x}}").is_err());
        assert!(cache.is_empty());
    }
}
