use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::source::DocumentSource;

/// A chunk of text with the link it was taken from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub link: Option<String>,
    pub text: String,
}

impl Section {
    pub fn new(link: Option<String>, text: impl Into<String>) -> Self {
        Self {
            link,
            text: text.into(),
        }
    }
}

/// Metadata values are either a single string or a list of strings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    Single(String),
    List(Vec<String>),
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Single(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Single(value.to_string())
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(value: Vec<String>) -> Self {
        MetadataValue::List(value)
    }
}

/// Document produced by a connector, ready for indexing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique within the source
    pub id: String,
    pub sections: Vec<Section>,
    pub source: DocumentSource,
    /// Human readable name shown in search results
    pub semantic_identifier: String,
    pub title: Option<String>,
    pub metadata: BTreeMap<String, MetadataValue>,
    pub doc_updated_at: Option<DateTime<Utc>>,
    pub primary_owners: Option<Vec<String>>,
}

impl Document {
    pub fn new(
        id: impl Into<String>,
        source: DocumentSource,
        semantic_identifier: impl Into<String>,
        sections: Vec<Section>,
    ) -> Self {
        Self {
            id: id.into(),
            sections,
            source,
            semantic_identifier: semantic_identifier.into(),
            title: None,
            metadata: BTreeMap::new(),
            doc_updated_at: None,
            primary_owners: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_updated_at(mut self, updated_at: Option<DateTime<Utc>>) -> Self {
        self.doc_updated_at = updated_at;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_owners(mut self, owners: Vec<String>) -> Self {
        if !owners.is_empty() {
            self.primary_owners = Some(owners);
        }
        self
    }

    /// Concatenated text of every section
    pub fn full_text(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Id-only view of a document, used to detect deletions at the source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SlimDocument {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_builder() {
        let doc = Document::new(
            "https://example.com/a",
            DocumentSource::Web,
            "A",
            vec![Section::new(None, "first"), Section::new(None, "second")],
        )
        .with_metadata("tags", vec!["x".to_string(), "y".to_string()])
        .with_owners(vec![]);

        assert_eq!(doc.full_text(), "first\nsecond");
        assert_eq!(doc.primary_owners, None);
        assert_eq!(
            serde_json::to_value(&doc.metadata).unwrap(),
            serde_json::json!({ "tags": ["x", "y"] })
        );
    }
}
