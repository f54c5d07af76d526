//! Completeness checks on raw inventory records.
//!
//! The inventory is the only source of truth for every later decision. If the
//! registry starts returning records without the fields the cleaner relies on,
//! the run stops here instead of deleting on incomplete data.

use serde_json::Value;
use thiserror::Error;

use super::artifact::Artifact;

/// Fields every inventory record must carry. A field holding `null`, `0` or an
/// empty string counts as present.
pub const REQUIRED_FIELDS: [&str; 10] = [
    "tags",
    "name",
    "format",
    "status_str",
    "uploaded_at",
    "status_updated_at",
    "identifier_perm",
    "size",
    "summary",
    "version",
];

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("record #{index} is not a JSON object")]
    NotAnObject { index: usize },

    #[error("package {name} (record #{index}) is missing or has undefined field: {field}")]
    MissingField {
        index: usize,
        name: String,
        field: &'static str,
    },

    #[error("package {name} (record #{index}) is malformed: {source}")]
    Malformed {
        index: usize,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("identifier {identifier} appears more than once in the inventory")]
    DuplicateIdentifier { identifier: String },
}

/// Check one raw record for completeness and convert it into an [`Artifact`].
pub fn validate_record(index: usize, record: Value) -> Result<Artifact, ValidationError> {
    let object = record
        .as_object()
        .ok_or(ValidationError::NotAnObject { index })?;

    let name = object
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>")
        .to_string();

    if let Some(&field) = REQUIRED_FIELDS
        .iter()
        .find(|field| !object.contains_key(**field))
    {
        return Err(ValidationError::MissingField {
            index,
            name,
            field,
        });
    }

    serde_json::from_value(record).map_err(|source| ValidationError::Malformed {
        index,
        name,
        source,
    })
}
