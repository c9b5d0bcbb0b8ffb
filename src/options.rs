use serde::{Deserialize, Serialize};

/// Knobs for discovery, compilation and rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileOptions {
    /// Logical name (file stem) of the page-shell document.
    pub shell_name: String,
    /// Extensions picked up by directory discovery, without the dot.
    pub extensions: Vec<String>,
    /// Maximum nesting of component invocations within one render.
    pub max_depth: usize,
    /// Tag used for the synthetic wrapper around rootless markup.
    pub wrapper_tag: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            shell_name: "layout".to_string(),
            extensions: vec!["html".to_string(), "tmpl".to_string()],
            max_depth: 64,
            wrapper_tag: "div".to_string(),
        }
    }
}

impl CompileOptions {
    pub fn with_shell(shell_name: impl Into<String>) -> Self {
        Self {
            shell_name: shell_name.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let opts = CompileOptions::from_json(r#"{"shellName":"base","maxDepth":8}"#).unwrap();
        assert_eq!(opts.shell_name, "base");
        assert_eq!(opts.max_depth, 8);
        assert_eq!(opts.wrapper_tag, "div");
        assert!(opts.accepts_extension("HTML"));
        assert!(!opts.accepts_extension("zen"));
    }
}
