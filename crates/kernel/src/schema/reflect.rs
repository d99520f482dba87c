//! Field path resolution.
//!
//! A field path such as `owner.role.title` is walked left to right against
//! the registry: every non-terminal segment must name a relationship (which
//! adds a left outer join), and the terminal segment must name a column.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::{Cardinality, ColumnType, EntitySchema, Relationship, SchemaRegistry};
use crate::error::{ListError, ListOpResult};

/// Separator between the segments of a join alias.
const ALIAS_SEPARATOR: &str = "__";

/// PostgreSQL truncates identifiers longer than this many bytes.
const MAX_ALIAS_LEN: usize = 63;

/// Non-empty dotted identifier sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(text: &str) -> ListOpResult<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ListError::invalid_path(text, "path is empty"));
        }

        let mut segments = Vec::new();
        for segment in trimmed.split('.') {
            if segment.is_empty() {
                return Err(ListError::invalid_path(text, "path has an empty segment"));
            }
            if !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(ListError::invalid_path(
                    text,
                    format!("'{segment}' is not a valid identifier"),
                ));
            }
            segments.push(segment.to_string());
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for FieldPath {
    type Err = ListError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A column addressed through a table alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table_alias: String,
    pub column: String,
    pub column_type: ColumnType,
}

/// One left outer join along a relationship edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinStep {
    /// Alias of the joined table; unique per relationship path.
    pub alias: String,
    pub table: String,
    /// Alias the join hangs off.
    pub from_alias: String,
    pub local_column: String,
    pub foreign_column: String,
    pub cardinality: Cardinality,
}

/// Result of resolving a field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    pub column: ColumnRef,
    /// Joins needed to reach the column, in traversal order.
    pub joins: Vec<JoinStep>,
}

/// Resolve `path` against `root`.
///
/// A path of `n` segments yields `n - 1` joins and one column reference.
pub fn resolve(
    registry: &SchemaRegistry,
    root: &EntitySchema,
    path: &FieldPath,
) -> ListOpResult<ResolvedField> {
    let mut alias = root.table_name().to_string();
    let mut target: Option<Arc<EntitySchema>> = None;
    let mut joins = Vec::new();
    let segments = path.segments();

    for (i, segment) in segments.iter().enumerate() {
        let is_last = i + 1 == segments.len();
        let current: &EntitySchema = target.as_deref().unwrap_or(root);

        if let Some(column_type) = current.column_type(segment) {
            if !is_last {
                return Err(ListError::invalid_path(
                    path.to_string(),
                    format!(
                        "'{segment}' is a column of '{}' and cannot be traversed",
                        current.name
                    ),
                ));
            }
            return Ok(ResolvedField {
                column: ColumnRef {
                    table_alias: alias,
                    column: segment.clone(),
                    column_type,
                },
                joins,
            });
        }

        let Some(rel) = current.find_relationship(segment) else {
            return Err(ListError::invalid_path(
                path.to_string(),
                format!(
                    "'{segment}' is not a column or relationship of '{}'",
                    current.name
                ),
            ));
        };

        if is_last {
            return Err(ListError::invalid_path(
                path.to_string(),
                format!("path ends on relationship '{segment}'; name a column of it"),
            ));
        }

        let next = registry.get(&rel.target).ok_or_else(|| {
            ListError::invalid_path(
                path.to_string(),
                format!("relationship '{segment}' targets unknown entity '{}'", rel.target),
            )
        })?;

        let next_alias = format!("{alias}{ALIAS_SEPARATOR}{segment}");
        if next_alias.len() > MAX_ALIAS_LEN {
            return Err(ListError::invalid_path(
                path.to_string(),
                format!(
                    "path nests too deeply; alias '{next_alias}' exceeds {MAX_ALIAS_LEN} bytes"
                ),
            ));
        }
        joins.push(JoinStep {
            alias: next_alias.clone(),
            table: next.table_name().to_string(),
            from_alias: alias,
            local_column: rel.local_column.clone(),
            foreign_column: rel.foreign_column.clone(),
            cardinality: rel.cardinality,
        });
        alias = next_alias;
        target = Some(next);
    }

    Err(ListError::invalid_path(path.to_string(), "path is empty"))
}

/// Resolve a path made only of relationships (an eager-load hint).
///
/// Returns each traversed relationship paired with its target schema.
pub fn resolve_relationships(
    registry: &SchemaRegistry,
    root: &EntitySchema,
    path: &FieldPath,
) -> ListOpResult<Vec<(Relationship, Arc<EntitySchema>)>> {
    let mut steps: Vec<(Relationship, Arc<EntitySchema>)> = Vec::with_capacity(path.len());

    for segment in path.segments() {
        let current: &EntitySchema = match steps.last() {
            Some((_, schema)) => schema,
            None => root,
        };
        let Some(rel) = current.find_relationship(segment) else {
            return Err(ListError::invalid_path(
                path.to_string(),
                format!("'{segment}' is not a relationship of '{}'", current.name),
            ));
        };
        let target = registry.get(&rel.target).ok_or_else(|| {
            ListError::invalid_path(
                path.to_string(),
                format!("relationship '{segment}' targets unknown entity '{}'", rel.target),
            )
        })?;
        let rel = rel.clone();
        steps.push((rel, target));
    }

    Ok(steps)
}
