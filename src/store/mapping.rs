//! Typed index mappings.
//!
//! An [`IndexMapping`] serializes to the `{"properties": {...}}` object the
//! search engine expects, and tells the embedded backend which fields are
//! full-text, which are exact-match, which are dates, and where the vector lives.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Vector similarity metric for a `dense_vector` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    Cosine,
}

/// Mapping for a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldMapping {
    /// Analyzed full-text field.
    Text,
    /// Exact-match field; may hold a single value or an array of values.
    Keyword,
    Date,
    Boolean,
    DenseVector {
        dims: usize,
        #[serde(default = "default_true")]
        index: bool,
        similarity: Similarity,
    },
}

fn default_true() -> bool {
    true
}

impl FieldMapping {
    pub fn dense_vector(dims: usize) -> Self {
        Self::DenseVector {
            dims,
            index: true,
            similarity: Similarity::Cosine,
        }
    }
}

/// Field mappings for one index, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexMapping {
    pub properties: BTreeMap<String, FieldMapping>,
}

impl IndexMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion.
    pub fn field(mut self, name: &str, mapping: FieldMapping) -> Self {
        self.properties.insert(name.to_string(), mapping);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldMapping> {
        self.properties.get(name)
    }

    /// Names of full-text fields, in stable (sorted) order.
    pub fn text_fields(&self) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|(_, m)| matches!(m, FieldMapping::Text))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Every `dense_vector` field with its dimensionality.
    pub fn vector_fields(&self) -> Vec<(&str, usize)> {
        self.properties
            .iter()
            .filter_map(|(name, m)| match m {
                FieldMapping::DenseVector { dims, .. } => Some((name.as_str(), *dims)),
                _ => None,
            })
            .collect()
    }

    /// The single vector field, if the mapping has one.
    pub fn vector_field(&self) -> Option<(&str, usize)> {
        self.vector_fields().into_iter().next()
    }

    /// Reject field names that cannot be used safely as JSON paths or column names,
    /// and zero-dimensional vectors.
    pub fn validate(&self) -> Result<()> {
        for (name, mapping) in &self.properties {
            validate_field_name(name)?;
            if let FieldMapping::DenseVector { dims, .. } = mapping {
                if *dims == 0 {
                    return Err(Error::validation(format!(
                        "dense_vector field {name} must have dims > 0"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Index names: lowercase ASCII letters, digits and underscores, not starting with `_`.
pub fn validate_index_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first.is_ascii_digit() => chars
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::validation(format!("invalid index name: {name:?}")))
    }
}

/// Field names: lowercase ASCII letters, digits and underscores, not starting with a digit.
pub fn validate_field_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first == '_' => chars
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::validation(format!("invalid field name: {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_in_search_engine_shape() {
        let mapping = IndexMapping::new()
            .field("content", FieldMapping::Text)
            .field("tags", FieldMapping::Keyword)
            .field("embedding", FieldMapping::dense_vector(4));

        let json = serde_json::to_value(&mapping).unwrap();
        assert_eq!(json["properties"]["content"]["type"], "text");
        assert_eq!(json["properties"]["tags"]["type"], "keyword");
        assert_eq!(json["properties"]["embedding"]["type"], "dense_vector");
        assert_eq!(json["properties"]["embedding"]["dims"], 4);
        assert_eq!(json["properties"]["embedding"]["similarity"], "cosine");
        assert_eq!(json["properties"]["embedding"]["index"], true);
    }

    #[test]
    fn text_and_vector_fields() {
        let mapping = IndexMapping::new()
            .field("title", FieldMapping::Text)
            .field("content", FieldMapping::Text)
            .field("created_at", FieldMapping::Date)
            .field("embedding", FieldMapping::dense_vector(8));

        assert_eq!(mapping.text_fields(), vec!["content", "title"]);
        assert_eq!(mapping.vector_field(), Some(("embedding", 8)));
    }

    #[test]
    fn name_validation() {
        assert!(validate_index_name("memories").is_ok());
        assert!(validate_index_name("test_memories_2").is_ok());
        assert!(validate_index_name("_hidden").is_err());
        assert!(validate_index_name("Bad-Name").is_err());
        assert!(validate_index_name("").is_err());

        assert!(validate_field_name("user_id").is_ok());
        assert!(validate_field_name("_score").is_ok());
        assert!(validate_field_name("1abc").is_err());
        assert!(validate_field_name("a.b").is_err());
        assert!(validate_field_name("x'y").is_err());
    }

    #[test]
    fn zero_dims_rejected() {
        let mapping = IndexMapping::new().field("embedding", FieldMapping::dense_vector(0));
        assert!(mapping.validate().is_err());
    }
}
