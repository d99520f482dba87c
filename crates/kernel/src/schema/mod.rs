//! Entity schema registry.
//!
//! Describes every listable entity structurally: its columns (name and
//! semantic type) and its relationships to other entities. The registry is
//! built once at startup, either programmatically or from a TOML catalog,
//! and is read-only afterwards.

pub mod reflect;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::error::{ListError, ListOpResult};

pub use reflect::{ColumnRef, FieldPath, JoinStep, ResolvedField};

/// Semantic type of a column, as far as filtering is concerned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Text,
    Integer,
    Float,
    Decimal,
    Boolean,
    Timestamp,
    /// JSON document; filtered through its text form.
    Json,
}

impl ColumnType {
    /// Integer, float or decimal.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ColumnType::Integer | ColumnType::Float | ColumnType::Decimal
        )
    }

    pub fn is_textual(self) -> bool {
        matches!(self, ColumnType::String | ColumnType::Text)
    }
}

/// How many target rows a relationship reaches from one owner row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    One,
    Many,
}

/// Named edge from one entity to another.
///
/// The join condition is `owner.local_column = target.foreign_column`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Relationship {
    pub name: String,

    /// Name of the target entity in the registry.
    pub target: String,

    #[serde(default)]
    pub cardinality: Cardinality,

    pub local_column: String,

    pub foreign_column: String,
}

impl Relationship {
    /// Many-to-one or one-to-one edge, e.g. `product.category`.
    pub fn to_one(name: &str, target: &str, local_column: &str, foreign_column: &str) -> Self {
        Self {
            name: name.to_string(),
            target: target.to_string(),
            cardinality: Cardinality::One,
            local_column: local_column.to_string(),
            foreign_column: foreign_column.to_string(),
        }
    }

    /// One-to-many edge, e.g. `category.children`.
    pub fn to_many(name: &str, target: &str, local_column: &str, foreign_column: &str) -> Self {
        Self {
            cardinality: Cardinality::Many,
            ..Self::to_one(name, target, local_column, foreign_column)
        }
    }
}

fn default_primary_key() -> String {
    "id".to_string()
}

/// Structural description of one queryable entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Registry key, e.g. `product`.
    pub name: String,

    /// Backing table; defaults to `name`.
    #[serde(default)]
    pub table: Option<String>,

    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    /// Field paths searched when a caller supplies a search term but no fields.
    #[serde(default)]
    pub search_fields: Vec<String>,

    #[serde(default)]
    pub columns: BTreeMap<String, ColumnType>,

    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl EntitySchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: None,
            primary_key: default_primary_key(),
            search_fields: Vec::new(),
            columns: BTreeMap::new(),
            relationships: Vec::new(),
        }
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn with_primary_key(mut self, column: &str) -> Self {
        self.primary_key = column.to_string();
        self
    }

    pub fn column(mut self, name: &str, column_type: ColumnType) -> Self {
        self.columns.insert(name.to_string(), column_type);
        self
    }

    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn with_search_fields(mut self, fields: &[&str]) -> Self {
        self.search_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns.get(name).copied()
    }

    pub fn find_relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }
}

#[derive(Deserialize)]
struct Catalog {
    #[serde(default, rename = "entity")]
    entities: Vec<EntitySchema>,
}

/// Registry of entity schemas keyed by entity name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entities: HashMap<String, Arc<EntitySchema>>,
}

impl SchemaRegistry {
    /// Build and validate a registry.
    pub fn build(entities: Vec<EntitySchema>) -> Result<Self> {
        let mut map = HashMap::with_capacity(entities.len());
        for entity in entities {
            let name = entity.name.clone();
            if map.insert(name.clone(), Arc::new(entity)).is_some() {
                bail!("entity '{name}' is declared more than once");
            }
        }
        let registry = Self { entities: map };
        registry.validate()?;
        Ok(registry)
    }

    /// Parse a TOML catalog made of `[[entity]]` tables.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let catalog: Catalog = toml::from_str(source).context("failed to parse schema catalog")?;
        Self::build(catalog.entities)
    }

    /// Load a TOML catalog from disk.
    pub fn load_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read schema catalog {}", path.display()))?;
        Self::from_toml_str(&source)
            .with_context(|| format!("invalid schema catalog {}", path.display()))
    }

    pub fn get(&self, name: &str) -> Option<Arc<EntitySchema>> {
        self.entities.get(name).cloned()
    }

    /// Look up an entity, failing with [`ListError::UnknownEntity`].
    pub fn entity(&self, name: &str) -> ListOpResult<Arc<EntitySchema>> {
        self.get(name)
            .ok_or_else(|| ListError::UnknownEntity(name.to_string()))
    }

    /// Entity names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Resolve a dotted path against `root`.
    pub fn resolve(&self, root: &EntitySchema, path: &FieldPath) -> ListOpResult<ResolvedField> {
        reflect::resolve(self, root, path)
    }

    fn validate(&self) -> Result<()> {
        for entity in self.entities.values() {
            let name = &entity.name;

            if !entity.columns.contains_key(&entity.primary_key) {
                bail!(
                    "entity '{name}': primary key '{}' is not a column",
                    entity.primary_key
                );
            }

            for rel in &entity.relationships {
                if entity.columns.contains_key(&rel.name) {
                    bail!(
                        "entity '{name}': '{}' is both a column and a relationship",
                        rel.name
                    );
                }
                if entity
                    .relationships
                    .iter()
                    .filter(|r| r.name == rel.name)
                    .count()
                    > 1
                {
                    bail!("entity '{name}': relationship '{}' declared twice", rel.name);
                }
                let Some(target) = self.entities.get(&rel.target) else {
                    bail!(
                        "entity '{name}': relationship '{}' targets unknown entity '{}'",
                        rel.name,
                        rel.target
                    );
                };
                if !entity.columns.contains_key(&rel.local_column) {
                    bail!(
                        "entity '{name}': relationship '{}' joins on unknown column '{}'",
                        rel.name,
                        rel.local_column
                    );
                }
                if !target.columns.contains_key(&rel.foreign_column) {
                    bail!(
                        "entity '{name}': relationship '{}' joins on unknown column '{}.{}'",
                        rel.name,
                        rel.target,
                        rel.foreign_column
                    );
                }
            }
        }

        // Search fields may cross relationships, so check them once every
        // entity is known.
        for entity in self.entities.values() {
            for field in &entity.search_fields {
                let path = FieldPath::parse(field)
                    .with_context(|| format!("entity '{}': bad search field", entity.name))?;
                self.resolve(entity, &path)
                    .with_context(|| format!("entity '{}': bad search field", entity.name))?;
            }
        }

        Ok(())
    }
}
