//! Table definitions and the schema normalizer
//!
//! Hosts declare tables as a list of [`TableDefinition`]s. The normalizer
//! validates them and derives, per table, the primary key field and the list
//! of secondary (indexed) fields.
//!
//! A table without an explicit key path gets the synthetic key field `id`.
//! Under the default [`IdFieldPolicy::Drop`], a plain field that is itself
//! named `id` is then treated as the synthetic key and dropped from the
//! secondary fields, so it gets no index.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::logging::prefix;

/// Key field assumed when no field is marked as the key path.
pub const DEFAULT_KEY_PATH: &str = "id";

/// A declared field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(
        default,
        rename = "keyPath",
        alias = "isKeyPath",
        skip_serializing_if = "Option::is_none"
    )]
    pub key_path: Option<bool>,
}

impl FieldDefinition {
    /// An ordinary (indexed) field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: None,
        }
    }

    /// A field holding the table's primary key.
    pub fn key(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: Some(true),
        }
    }

    pub fn is_key_path(&self) -> bool {
        self.key_path == Some(true)
    }
}

/// A declared table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldDefinition>>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: None,
        }
    }

    /// Append a field.
    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.get_or_insert_with(Vec::new).push(field);
        self
    }
}

/// Canonical field layout of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedFields {
    /// Secondary fields, one index each, in declaration order
    pub other: Vec<FieldDefinition>,
    pub key_path_field: String,
}

impl Default for NormalizedFields {
    fn default() -> Self {
        Self {
            other: Vec::new(),
            key_path_field: DEFAULT_KEY_PATH.to_string(),
        }
    }
}

/// Canonical form of a table, consumed by table creation and indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedSchema {
    pub name: String,
    pub fields: NormalizedFields,
}

impl NormalizedSchema {
    /// Names of the indexes created for this table.
    pub fn index_names(&self) -> impl Iterator<Item = &str> {
        self.fields.other.iter().map(|f| f.name.as_str())
    }
}

/// What to do with a plain field named `id` in a table without an explicit
/// key path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdFieldPolicy {
    /// Treat it as the synthetic key and drop it from the indexed fields.
    #[default]
    Drop,
    /// Reject the declaration.
    Reject,
}

/// Validate and canonicalize table definitions.
pub fn normalize_tables(tables: &[TableDefinition]) -> Result<Vec<NormalizedSchema>> {
    normalize_tables_with(tables, IdFieldPolicy::default())
}

/// Validate and canonicalize table definitions with an explicit `id` policy.
///
/// # Errors
///
/// Returns `Error::Schema` when a table or field has no name, a name is
/// repeated, or a table marks more than one field as its key path.
pub fn normalize_tables_with(
    tables: &[TableDefinition],
    policy: IdFieldPolicy,
) -> Result<Vec<NormalizedSchema>> {
    let mut names: HashSet<&str> = HashSet::new();
    let mut normalized = Vec::with_capacity(tables.len());

    for table in tables {
        if table.name.is_empty() {
            return Err(Error::Schema("Table name not given".into()));
        }
        if !names.insert(table.name.as_str()) {
            return Err(Error::Schema(format!(
                "Multiple table name {} used",
                table.name
            )));
        }

        let fields = match &table.fields {
            Some(fields) => normalize_fields(fields, &table.name, policy)?,
            None => NormalizedFields::default(),
        };

        normalized.push(NormalizedSchema {
            name: table.name.clone(),
            fields,
        });
    }

    Ok(normalized)
}

fn normalize_fields(
    fields: &[FieldDefinition],
    table: &str,
    policy: IdFieldPolicy,
) -> Result<NormalizedFields> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut key_path: Option<&str> = None;
    let mut other = Vec::with_capacity(fields.len());

    for field in fields {
        if field.name.is_empty() {
            return Err(Error::Schema(format!(
                "Field name not given for table {}",
                table
            )));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(Error::Schema(format!(
                "Multiple field name {} used in table {}",
                field.name, table
            )));
        }

        if field.is_key_path() {
            if key_path.is_some() {
                return Err(Error::Schema(format!(
                    "Only one keyPath per table is allowed. Found in table {}",
                    table
                )));
            }
            key_path = Some(field.name.as_str());
            continue;
        }

        other.push(field.clone());
    }

    let key_path_field = match key_path {
        Some(name) => name.to_string(),
        None => {
            if let Some(pos) = other.iter().position(|f| f.name == DEFAULT_KEY_PATH) {
                match policy {
                    IdFieldPolicy::Drop => {
                        warn!(
                            "{} table '{}': field '{}' shadows the default key and will not be indexed",
                            prefix::DB,
                            table,
                            DEFAULT_KEY_PATH
                        );
                        other.remove(pos);
                    }
                    IdFieldPolicy::Reject => {
                        return Err(Error::Schema(format!(
                            "Field {} in table {} collides with the default key; mark it keyPath or rename it",
                            DEFAULT_KEY_PATH, table
                        )));
                    }
                }
            }
            DEFAULT_KEY_PATH.to_string()
        }
    };

    Ok(NormalizedFields {
        other,
        key_path_field,
    })
}
