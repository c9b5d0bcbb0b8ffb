use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read {}: {source}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Layout template must contain {anchor} tag")]
    MissingAnchor { anchor: &'static str },

    #[error("Layout template '{name}' not found in any of the provided directories")]
    ShellNotFound { name: String },

    #[error("Layout template not defined")]
    NoShell,

    #[error("Component '{name}' not found")]
    ComponentNotFound { name: String },

    #[error("dict: {0}")]
    Dict(String),

    #[error("Component '{name}' exceeded the nesting limit of {depth}")]
    RecursionLimit { name: String, depth: usize },

    #[error("Failed to parse template '{name}': {message}")]
    TemplateParse { name: String, message: String },

    #[error("Error executing template '{name}': {message}")]
    Evaluation { name: String, message: String },

    #[error("Error calling {name}: {message}")]
    Function { name: String, message: String },

    #[error("Invalid render data: {0}")]
    Data(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn function(name: &str, message: impl Into<String>) -> Self {
        Self::Function {
            name: name.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn evaluation(name: &str, message: impl Into<String>) -> Self {
        Self::Evaluation {
            name: name.to_string(),
            message: message.into(),
        }
    }
}
