//! Schema catalog: the process-lifetime description of the domain database.
//!
//! Loaded once from `catalog/schema.json`, validated, and shared read-only
//! (behind an `Arc`) by the prompt builder, the validator and the HTTP layer.

use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

use crate::sql_refs::{parse_statements, referenced_tables};

// ---------- errors ----------

/// The catalog file is unreadable, malformed, or internally inconsistent.
#[derive(Debug)]
pub struct CatalogCorruptError {
    pub reason: String,
}

impl CatalogCorruptError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CatalogCorruptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Schema catalog corrupt: {}", self.reason)
    }
}

impl std::error::Error for CatalogCorruptError {}

// ---------- column / table specs ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    String,
    Integer,
    Float,
    Bool,
    Date,
    Timestamp,
    Uuid,
    Geometry,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::String => "string",
            SemanticType::Integer => "integer",
            SemanticType::Float => "float",
            SemanticType::Bool => "bool",
            SemanticType::Date => "date",
            SemanticType::Timestamp => "timestamp",
            SemanticType::Uuid => "uuid",
            SemanticType::Geometry => "geometry",
        }
    }
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnSpec {
    #[serde(rename = "type")]
    pub semantic_type: SemanticType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    /// Foreign-key target as `table.column`.
    #[serde(default)]
    pub references: Option<String>,
    /// Closed, case-sensitive value domain.
    #[serde(default, rename = "enum")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ColumnSpec {
    pub fn references_table(&self) -> Option<&str> {
        self.references
            .as_deref()
            .map(|r| r.split('.').next().unwrap_or(r))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogExample {
    pub query: String,
    pub sql: String,
}

#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: String,
    pub description: String,
    /// Columns in file order.
    pub columns: Vec<(String, ColumnSpec)>,
    pub examples: Vec<CatalogExample>,
}

impl TableSpec {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, spec)| spec)
    }
}

#[derive(Deserialize)]
struct RawTable {
    description: String,
    columns: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    examples: Vec<CatalogExample>,
}

// ---------- catalog ----------

#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    tables: Vec<TableSpec>,
    index: HashMap<String, usize>,
}

impl SchemaCatalog {
    /// Read and validate the catalog file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogCorruptError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CatalogCorruptError::new(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, CatalogCorruptError> {
        let root: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| CatalogCorruptError::new(format!("invalid JSON: {e}")))?;

        let raw_tables = root
            .get("tables")
            .and_then(|t| t.as_object())
            .ok_or_else(|| CatalogCorruptError::new("missing top-level object 'tables'"))?;

        if raw_tables.is_empty() {
            return Err(CatalogCorruptError::new("'tables' is empty"));
        }

        let mut tables = Vec::with_capacity(raw_tables.len());
        for (name, value) in raw_tables {
            let raw: RawTable = serde_json::from_value(value.clone())
                .map_err(|e| CatalogCorruptError::new(format!("table '{name}': {e}")))?;

            if raw.columns.is_empty() {
                return Err(CatalogCorruptError::new(format!(
                    "table '{name}' has no columns"
                )));
            }

            let mut columns = Vec::with_capacity(raw.columns.len());
            for (col_name, col_value) in raw.columns {
                let spec: ColumnSpec = serde_json::from_value(col_value).map_err(|e| {
                    CatalogCorruptError::new(format!("column '{name}.{col_name}': {e}"))
                })?;
                columns.push((col_name, spec));
            }

            tables.push(TableSpec {
                name: name.to_lowercase(),
                description: raw.description,
                columns,
                examples: raw.examples,
            });
        }

        let index = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();

        let catalog = Self { tables, index };
        catalog.check_references()?;
        catalog.check_examples()?;
        Ok(catalog)
    }

    /// Foreign keys must point at catalogued tables.
    fn check_references(&self) -> Result<(), CatalogCorruptError> {
        for table in &self.tables {
            for (col_name, spec) in &table.columns {
                if let Some(target) = spec.references_table()
                    && !self.index.contains_key(target)
                {
                    return Err(CatalogCorruptError::new(format!(
                        "column '{}.{col_name}' references unknown table '{target}'",
                        table.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Every table referenced by an example SQL must be catalogued.
    fn check_examples(&self) -> Result<(), CatalogCorruptError> {
        for table in &self.tables {
            for example in &table.examples {
                let statements = parse_statements(&example.sql).map_err(|e| {
                    CatalogCorruptError::new(format!(
                        "example '{}' in table '{}' does not parse: {e}",
                        example.query, table.name
                    ))
                })?;
                for referenced in referenced_tables(&statements) {
                    if !self.index.contains_key(&referenced) {
                        return Err(CatalogCorruptError::new(format!(
                            "example '{}' references unknown table '{referenced}'",
                            example.query
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn lookup(&self, table: &str) -> Option<&TableSpec> {
        self.index
            .get(&table.to_lowercase())
            .map(|&i| &self.tables[i])
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSpec> {
        self.tables.iter()
    }

    pub fn known_tables(&self) -> BTreeSet<String> {
        self.index.keys().cloned().collect()
    }

    /// All canned (NL, SQL) pairs in table order.
    pub fn examples(&self) -> impl Iterator<Item = &CatalogExample> {
        self.tables.iter().flat_map(|t| t.examples.iter())
    }

    /// Compact, prompt-sized description: one header line per table and one
    /// line per column carrying type, key, nullability and enum domain.
    pub fn render_for_prompt(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            out.push_str(&format!("TABLE {} -- {}\n", table.name, table.description));
            for (col_name, spec) in &table.columns {
                let mut line = format!("  {col_name} {}", spec.semantic_type.as_str());
                if spec.primary_key {
                    line.push_str(" PK");
                }
                if !spec.nullable {
                    line.push_str(" NOT NULL");
                }
                if let Some(target) = &spec.references {
                    line.push_str(&format!(" FK->{target}"));
                }
                if let Some(values) = &spec.enum_values {
                    let quoted: Vec<String> = values.iter().map(|v| format!("'{v}'")).collect();
                    line.push_str(&format!(" ENUM({})", quoted.join(", ")));
                }
                if let Some(desc) = &spec.description {
                    line.push_str(&format!(" -- {desc}"));
                }
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }
}
