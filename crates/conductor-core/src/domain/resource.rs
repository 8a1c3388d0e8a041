use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace a resource is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Bucket {
    /// Source of user-defined custom steps
    Lambda,
}

impl Bucket {
    /// Stored name
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Lambda => "lambda",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A versioned blob of content, such as the source of a custom step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Name, unique within a bucket
    pub name: String,

    /// Version number, starting at 1
    pub version: i32,

    /// MIME type of `content`
    pub content_type: String,

    /// The content itself
    pub content: String,
}

impl Resource {
    /// Build a resource
    pub fn new(
        name: impl Into<String>,
        version: i32,
        content_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            content_type: content_type.into(),
            content: content.into(),
        }
    }

    /// `name@version`, used in logs
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bucket_serializes_by_variant_name() {
        assert_eq!(serde_json::to_value(Bucket::Lambda).unwrap(), json!("Lambda"));
        assert_eq!(Bucket::Lambda.to_string(), "lambda");
    }

    #[test]
    fn resource_document_shape() {
        let resource = Resource::new("resize", 2, "text/x-python", "def run(): pass");
        assert_eq!(resource.key(), "resize@2");
        assert_eq!(
            serde_json::to_value(&resource).unwrap(),
            json!({
                "name": "resize",
                "version": 2,
                "content_type": "text/x-python",
                "content": "def run(): pass"
            })
        );
    }
}
