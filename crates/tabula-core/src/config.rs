//! Database configuration and its validating builder
//!
//! The configuration is assembled once during host setup and then shared
//! immutably with the connection and record layers. Changing it afterwards
//! means building a new one; an already-open database is unaffected.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::range::BoundMode;
use crate::schema::{normalize_tables_with, IdFieldPolicy, NormalizedSchema, TableDefinition};

/// Database name used when the host never sets one.
pub const DEFAULT_DATABASE_NAME: &str = "testDb";

/// Database version used when the host never sets one.
pub const DEFAULT_VERSION: u32 = 1;

/// Immutable database configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    name: String,
    version: u32,
    tables: Vec<NormalizedSchema>,
    bound_mode: BoundMode,
    id_field_policy: IdFieldPolicy,
}

impl DatabaseConfig {
    pub fn builder() -> DatabaseConfigBuilder {
        DatabaseConfigBuilder::default()
    }

    /// Load a configuration from JSON.
    ///
    /// ```json
    /// {
    ///   "name": "shop",
    ///   "version": 2,
    ///   "tables": [{"name": "items", "fields": [{"name": "sku"}]}],
    ///   "boundMode": "independent",
    ///   "idFieldPolicy": "drop"
    /// }
    /// ```
    ///
    /// Every key is optional and runs through the same validation as the
    /// builder.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(json)?;
        let mut builder = DatabaseConfig::builder()
            .id_field_policy(file.id_field_policy)
            .bound_mode(file.bound_mode);
        if let Some(name) = file.name {
            builder = builder.database_name(name)?;
        }
        if let Some(version) = file.version {
            builder = builder.version(version)?;
        }
        if let Some(tables) = file.tables {
            builder = builder.tables(&tables)?;
        }
        Ok(builder.build())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn tables(&self) -> &[NormalizedSchema] {
        &self.tables
    }

    /// Look up a declared table.
    pub fn table(&self, name: &str) -> Option<&NormalizedSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn bound_mode(&self) -> BoundMode {
        self.bound_mode
    }

    pub fn id_field_policy(&self) -> IdFieldPolicy {
        self.id_field_policy
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig::builder().build()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    name: Option<String>,
    // Signed so that negative versions reach validation instead of failing to parse
    version: Option<i64>,
    tables: Option<Vec<TableDefinition>>,
    #[serde(default)]
    bound_mode: BoundMode,
    #[serde(default)]
    id_field_policy: IdFieldPolicy,
}

/// Builder for [`DatabaseConfig`]. Each setter validates its argument.
#[derive(Debug, Clone)]
pub struct DatabaseConfigBuilder {
    name: String,
    version: u32,
    tables: Vec<NormalizedSchema>,
    bound_mode: BoundMode,
    id_field_policy: IdFieldPolicy,
}

impl Default for DatabaseConfigBuilder {
    fn default() -> Self {
        Self {
            name: DEFAULT_DATABASE_NAME.to_string(),
            version: DEFAULT_VERSION,
            tables: Vec::new(),
            bound_mode: BoundMode::default(),
            id_field_policy: IdFieldPolicy::default(),
        }
    }
}

impl DatabaseConfigBuilder {
    /// Set the database name. Fails on an empty name.
    pub fn database_name(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Config("Database name not given".into()));
        }
        self.name = name;
        Ok(self)
    }

    /// Set the database version. Fails below 1.
    pub fn version(mut self, version: impl Into<i64>) -> Result<Self> {
        let version = version.into();
        if version < 1 {
            return Err(Error::Config("Minimum version value must be 1".into()));
        }
        self.version = u32::try_from(version)
            .map_err(|_| Error::Config(format!("Database version {} is too large", version)))?;
        Ok(self)
    }

    /// Validate and normalize the table definitions.
    ///
    /// Uses the `id` policy set so far, so call [`id_field_policy`] first
    /// when overriding it.
    ///
    /// [`id_field_policy`]: DatabaseConfigBuilder::id_field_policy
    pub fn tables(mut self, tables: &[TableDefinition]) -> Result<Self> {
        self.tables = normalize_tables_with(tables, self.id_field_policy)?;
        Ok(self)
    }

    pub fn bound_mode(mut self, mode: BoundMode) -> Self {
        self.bound_mode = mode;
        self
    }

    pub fn id_field_policy(mut self, policy: IdFieldPolicy) -> Self {
        self.id_field_policy = policy;
        self
    }

    pub fn build(self) -> DatabaseConfig {
        DatabaseConfig {
            name: self.name,
            version: self.version,
            tables: self.tables,
            bound_mode: self.bound_mode,
            id_field_policy: self.id_field_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDefinition;

    #[test]
    fn test_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.name(), "testDb");
        assert_eq!(config.version(), 1);
        assert!(config.tables().is_empty());
        assert_eq!(config.bound_mode(), BoundMode::Independent);
    }

    #[test]
    fn test_builder_validates_name_and_version() {
        assert!(matches!(
            DatabaseConfig::builder().database_name(""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            DatabaseConfig::builder().version(0),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            DatabaseConfig::builder().version(-4),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            DatabaseConfig::builder().version(i64::from(u32::MAX) + 1),
            Err(Error::Config(_))
        ));

        let config = DatabaseConfig::builder()
            .database_name("shop")
            .unwrap()
            .version(3)
            .unwrap()
            .build();
        assert_eq!(config.name(), "shop");
        assert_eq!(config.version(), 3);
    }

    #[test]
    fn test_builder_normalizes_tables() {
        let config = DatabaseConfig::builder()
            .tables(&[TableDefinition::new("items").field(FieldDefinition::new("sku"))])
            .unwrap()
            .build();
        let items = config.table("items").unwrap();
        assert_eq!(items.fields.key_path_field, "id");
        assert!(config.table("orders").is_none());
    }

    #[test]
    fn test_builder_surfaces_schema_errors() {
        let result = DatabaseConfig::builder()
            .tables(&[TableDefinition::new("a"), TableDefinition::new("a")]);
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn test_policy_applies_to_later_tables() {
        let result = DatabaseConfig::builder()
            .id_field_policy(IdFieldPolicy::Reject)
            .tables(&[TableDefinition::new("a").field(FieldDefinition::new("id"))]);
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn test_from_json() {
        let config = DatabaseConfig::from_json(
            r#"{
                "name": "shop",
                "version": 2,
                "tables": [
                    {"name": "items", "fields": [{"name": "sku"}, {"name": "code", "keyPath": true}]}
                ],
                "boundMode": "legacy"
            }"#,
        )
        .unwrap();

        assert_eq!(config.name(), "shop");
        assert_eq!(config.version(), 2);
        assert_eq!(config.bound_mode(), BoundMode::Legacy);
        assert_eq!(config.tables()[0].fields.key_path_field, "code");
    }

    #[test]
    fn test_from_json_errors() {
        assert!(matches!(
            DatabaseConfig::from_json("{not json"),
            Err(Error::Serialization(_))
        ));
        assert!(matches!(
            DatabaseConfig::from_json(r#"{"version": 0}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            DatabaseConfig::from_json(r#"{"tables": [{"fields": []}]}"#),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn test_from_json_empty_object_uses_defaults() {
        assert_eq!(DatabaseConfig::from_json("{}").unwrap(), DatabaseConfig::default());
    }
}
