use serde::{Deserialize, Serialize};

/// A stored workflow definition version.
///
/// Step bodies are interpreted by the execution engine and kept opaque here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    /// Definition id, shared by every version
    pub id: String,

    /// Version number, starting at 1
    pub version: i32,

    /// Human readable description
    #[serde(default)]
    pub description: Option<String>,

    /// Type name of the workflow data payload
    #[serde(default)]
    pub data_type: Option<String>,

    /// Engine error behaviour applied when a step does not set its own
    #[serde(default)]
    pub default_error_behavior: Option<String>,

    /// Step documents
    #[serde(default)]
    pub steps: Vec<serde_json::Value>,
}

impl Definition {
    /// Definition without steps
    pub fn new(id: impl Into<String>, version: i32) -> Self {
        Self {
            id: id.into(),
            version,
            description: None,
            data_type: None,
            default_error_behavior: None,
            steps: Vec::new(),
        }
    }

    /// Add a step document
    pub fn with_step(mut self, step: serde_json::Value) -> Self {
        self.steps.push(step);
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// `id@version`, used in logs and error messages
    pub fn key(&self) -> String {
        format!("{}@{}", self.id, self.version)
    }
}
