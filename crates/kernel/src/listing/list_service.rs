//! List execution.
//!
//! `listop` compiles a typed filter bag against an entity, then runs the
//! count, the page and any eager loads in one backend session.
//! `list_records` is the string-keyed front door: it parses raw parameters,
//! runs `listop` and shapes the rows for the caller.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use super::filter::FilterCompiler;
use super::projection::project;
use super::query_builder::{self, QueryPlan};
use super::types::{ListFilters, ListLimits, ListOutcome, ListResult, OutputShape, Pagination};
use crate::db::ListSession;
use crate::error::{ListError, ListOpResult};
use crate::schema::{
    Cardinality, ColumnRef, ColumnType, EntitySchema, FieldPath, Relationship, SchemaRegistry,
    reflect::resolve_relationships,
};
use crate::state::ListContext;

/// Deepest relationship path accepted as an eager-load hint.
pub const MAX_INCLUDE_DEPTH: usize = 3;

pub const PAGE_PARAM: &str = "page";
pub const SKIP_PARAM: &str = "skip";
pub const LIMIT_PARAM: &str = "limit";
pub const SEARCH_TERM_PARAM: &str = "searchTerm";
pub const COLUMN_FILTERS_PARAM: &str = "columnFilters";
pub const NUMBER_RANGE_PARAM: &str = "numberRange";
pub const DATE_RANGE_PARAM: &str = "dateRange";

/// Largest row offset PostgreSQL accepts (`bigint`).
const MAX_OFFSET: u64 = i64::MAX as u64;

/// A filtered plan and its paginated form.
#[derive(Debug, Clone)]
pub struct CompiledList {
    filtered: QueryPlan,
    paged: QueryPlan,
}

impl CompiledList {
    pub fn count_sql(&self) -> String {
        self.filtered.count_sql()
    }

    pub fn page_sql(&self) -> String {
        self.paged.to_sql()
    }
}

/// Compile `filters` for `schema` without touching the database.
pub fn compile_list(
    registry: &SchemaRegistry,
    schema: &EntitySchema,
    filters: &ListFilters,
    search_fields: &[String],
    pagination: Pagination,
) -> ListOpResult<CompiledList> {
    let filtered = FilterCompiler::new(registry, schema).apply(
        QueryPlan::new(schema),
        search_fields,
        filters,
    )?;
    let paged = filtered
        .clone()
        .paginate(pagination.offset(), pagination.limit);
    Ok(CompiledList { filtered, paged })
}

/// List `schema` rows matching `filters`.
///
/// `total` counts every matching row regardless of pagination. An empty page
/// is a normal result. Each `join_plan` entry is a relationship path whose
/// rows are embedded under the relationship name.
pub async fn listop(
    ctx: &ListContext,
    schema: &EntitySchema,
    filters: &ListFilters,
    search_fields: &[String],
    join_plan: &[String],
    pagination: Pagination,
) -> ListOpResult<ListResult> {
    let includes = IncludeTree::build(ctx.registry(), schema, join_plan)?;
    let (count_sql, page_sql) = {
        let compiled = compile_list(ctx.registry(), schema, filters, search_fields, pagination)?;
        (compiled.count_sql(), compiled.page_sql())
    };

    let mut session = ctx.backend().session().await?;
    let total = session.count(&count_sql).await?;
    let mut rows = session.fetch(&page_sql).await?;

    if !rows.is_empty() && !includes.is_empty() {
        load_includes(session.as_mut(), &mut rows, &includes).await?;
    }
    session.finish().await?;

    Ok(ListResult { rows, total })
}

/// List `entity` from raw string parameters.
///
/// Reads `page`, `skip`, `limit`, `searchTerm`, `columnFilters`, `numberRange`
/// and `dateRange`. With no `search_fields`, the entity's default search
/// fields are used. An empty page is [`ListOutcome::NotFound`].
pub async fn list_records(
    ctx: &ListContext,
    entity: &str,
    params: &HashMap<String, String>,
    search_fields: &[String],
    join_plan: &[String],
    shape: &OutputShape,
) -> ListOpResult<ListOutcome> {
    let schema = ctx.registry().entity(entity)?;
    let (filters, pagination) = parse_list_params(params, ctx.limits())?;
    let search_fields = effective_search_fields(&schema, search_fields);

    let result = listop(ctx, &schema, &filters, search_fields, join_plan, pagination).await?;
    if result.rows.is_empty() {
        return Ok(ListOutcome::NotFound);
    }

    Ok(ListOutcome::Found(ListResult {
        rows: project(result.rows, shape),
        total: result.total,
    }))
}

/// Caller-supplied search fields, or the entity's defaults when none are given.
pub fn effective_search_fields<'a>(
    schema: &'a EntitySchema,
    requested: &'a [String],
) -> &'a [String] {
    if requested.is_empty() {
        &schema.search_fields
    } else {
        requested
    }
}

/// Split raw parameters into a filter bag and pagination.
pub fn parse_list_params(
    params: &HashMap<String, String>,
    limits: ListLimits,
) -> ListOpResult<(ListFilters, Pagination)> {
    let page = parse_count(params, PAGE_PARAM)?;
    if page == Some(0) {
        return Err(ListError::InvalidPagination(
            "page must be at least 1".to_string(),
        ));
    }

    let skip = parse_count(params, SKIP_PARAM)?.unwrap_or(0);
    if skip > MAX_OFFSET {
        return Err(ListError::InvalidPagination(format!(
            "skip must be at most {MAX_OFFSET}, got {skip}"
        )));
    }

    let limit = parse_count(params, LIMIT_PARAM)?.unwrap_or(limits.default_limit);
    if limit == 0 || limit > limits.max_limit {
        return Err(ListError::InvalidPagination(format!(
            "limit must be between 1 and {}, got {limit}",
            limits.max_limit
        )));
    }

    if let Some(page) = page {
        let offset = (page - 1).checked_mul(limit).filter(|o| *o <= MAX_OFFSET);
        if offset.is_none() {
            return Err(ListError::InvalidPagination(format!(
                "page {page} with limit {limit} starts beyond the last addressable row"
            )));
        }
    }

    let text = |name: &str| params.get(name).filter(|v| !v.is_empty()).cloned();
    let filters = ListFilters {
        search_term: text(SEARCH_TERM_PARAM),
        column_filters: text(COLUMN_FILTERS_PARAM),
        number_range: text(NUMBER_RANGE_PARAM),
        date_range: text(DATE_RANGE_PARAM),
        custom_filters: Vec::new(),
    };

    Ok((filters, Pagination::new(page, skip, limit)))
}

fn parse_count(params: &HashMap<String, String>, name: &str) -> ListOpResult<Option<u64>> {
    let Some(raw) = params.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    raw.parse::<u64>().map(Some).map_err(|_| {
        ListError::InvalidPagination(format!(
            "{name} must be a non-negative integer, got '{raw}'"
        ))
    })
}

/// Relationship hints grouped by prefix, so `user` and `user.role` share one
/// load of `user`.
#[derive(Debug, Default)]
struct IncludeTree {
    children: BTreeMap<String, IncludeNode>,
}

#[derive(Debug)]
struct IncludeNode {
    relationship: Relationship,
    target: Arc<EntitySchema>,
    nested: IncludeTree,
}

impl IncludeTree {
    fn build(
        registry: &SchemaRegistry,
        root: &EntitySchema,
        hints: &[String],
    ) -> ListOpResult<Self> {
        let mut tree = IncludeTree::default();
        for hint in hints {
            let path = FieldPath::parse(hint)?;
            if path.len() > MAX_INCLUDE_DEPTH {
                return Err(ListError::invalid_path(
                    hint.as_str(),
                    format!("eager loading is limited to {MAX_INCLUDE_DEPTH} levels"),
                ));
            }

            let mut level = &mut tree;
            for (relationship, target) in resolve_relationships(registry, root, &path)? {
                level = &mut level
                    .children
                    .entry(relationship.name.clone())
                    .or_insert_with(|| IncludeNode {
                        relationship,
                        target,
                        nested: IncludeTree::default(),
                    })
                    .nested;
            }
        }
        Ok(tree)
    }

    fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Load each hinted relationship with one batched `IN` query per level and
/// embed the results in `rows`: an object or null for to-one, an array for
/// to-many.
fn load_includes<'a>(
    session: &'a mut dyn ListSession,
    rows: &'a mut [Value],
    includes: &'a IncludeTree,
) -> Pin<Box<dyn Future<Output = ListOpResult<()>> + Send + 'a>> {
    Box::pin(async move {
        for (name, node) in &includes.children {
            let rel = &node.relationship;
            let singular = rel.cardinality == Cardinality::One;

            let mut keys: Vec<&Value> = Vec::new();
            for row in rows.iter() {
                if let Some(key) = row.get(&rel.local_column).filter(|k| !k.is_null()) {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
            }
            let bind: Vec<sea_query::Value> = keys.iter().filter_map(|k| sql_value(k)).collect();

            let mut related = if bind.is_empty() {
                Vec::new()
            } else {
                let foreign = ColumnRef {
                    table_alias: node.target.table_name().to_string(),
                    column: rel.foreign_column.clone(),
                    column_type: node
                        .target
                        .column_type(&rel.foreign_column)
                        .unwrap_or(ColumnType::Integer),
                };
                let sql = QueryPlan::new(&node.target)
                    .and_where(query_builder::one_of(&foreign, bind))
                    .to_sql();
                session.fetch(&sql).await?
            };

            if !related.is_empty() && !node.nested.is_empty() {
                load_includes(&mut *session, &mut related, &node.nested).await?;
            }

            for row in rows.iter_mut() {
                let key = row.get(&rel.local_column).filter(|k| !k.is_null()).cloned();
                let mut matching = related.iter().filter(|child| {
                    key.is_some() && child.get(&rel.foreign_column) == key.as_ref()
                });

                let embedded = if singular {
                    matching.next().cloned().unwrap_or(Value::Null)
                } else {
                    Value::Array(matching.cloned().collect())
                };
                if let Some(obj) = row.as_object_mut() {
                    obj.insert(name.clone(), embedded);
                }
            }
        }
        Ok(())
    })
}

fn sql_value(value: &Value) -> Option<sea_query::Value> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(sea_query::Value::from)
            .or_else(|| n.as_f64().map(sea_query::Value::from)),
        Value::String(s) => Some(sea_query::Value::from(s.clone())),
        Value::Bool(b) => Some(sea_query::Value::from(*b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Relationship;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn registry() -> SchemaRegistry {
        SchemaRegistry::build(vec![
            EntitySchema::new("role")
                .with_table("user_role")
                .column("id", ColumnType::Integer)
                .column("title", ColumnType::String),
            EntitySchema::new("user")
                .column("id", ColumnType::Integer)
                .column("email", ColumnType::String)
                .column("role_id", ColumnType::Integer)
                .relationship(Relationship::to_one("role", "role", "role_id", "id"))
                .with_search_fields(&["email"]),
        ])
        .unwrap()
    }

    #[test]
    fn defaults_when_params_absent() {
        let (filters, pagination) = parse_list_params(&params(&[]), ListLimits::default()).unwrap();
        assert_eq!(filters, ListFilters::default());
        assert_eq!(pagination, Pagination::new(None, 0, 10));
    }

    #[test]
    fn filters_are_read_by_wire_name() {
        let raw = params(&[
            ("searchTerm", "car"),
            ("columnFilters", r#"[["title","car"]]"#),
            ("numberRange", r#"["price","0","100000"]"#),
            ("dateRange", ""),
        ]);
        let (filters, _) = parse_list_params(&raw, ListLimits::default()).unwrap();
        assert_eq!(filters.search_term.as_deref(), Some("car"));
        assert_eq!(filters.column_filters.as_deref(), Some(r#"[["title","car"]]"#));
        assert_eq!(filters.number_range.as_deref(), Some(r#"["price","0","100000"]"#));
        assert!(filters.date_range.is_none());
    }

    #[test]
    fn page_and_skip_give_same_offset() {
        let limits = ListLimits::default();
        let (_, paged) =
            parse_list_params(&params(&[("page", "2"), ("limit", "10")]), limits).unwrap();
        let (_, skipped) =
            parse_list_params(&params(&[("skip", "10"), ("limit", "10")]), limits).unwrap();
        assert_eq!(paged.offset(), skipped.offset());
    }

    #[test]
    fn pagination_rejects_bad_numbers() {
        let limits = ListLimits::default();
        for bad in [
            vec![("page", "0")],
            vec![("page", "two")],
            vec![("skip", "-5")],
            vec![("limit", "0")],
            vec![("limit", "101")],
        ] {
            let result = parse_list_params(&params(&bad), limits);
            assert!(
                matches!(result, Err(ListError::InvalidPagination(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn offsets_beyond_bigint_are_rejected() {
        let limits = ListLimits::default();
        let max = i64::MAX.to_string();
        let (_, pagination) =
            parse_list_params(&params(&[("skip", max.as_str())]), limits).unwrap();
        assert_eq!(pagination.offset(), i64::MAX as u64);

        for bad in [
            vec![("skip", "18446744073709551615")],
            vec![("skip", "9223372036854775808")],
            vec![("page", "18446744073709551615"), ("limit", "10")],
            vec![("page", "922337203685477582"), ("limit", "10")],
        ] {
            let err = parse_list_params(&params(&bad), limits).unwrap_err();
            assert!(matches!(err, ListError::InvalidPagination(_)), "{bad:?}");
            assert!(err.is_client_error());
        }
    }

    #[test]
    fn compiled_count_and_page_share_filters() {
        let registry = registry();
        let user = registry.get("user").unwrap();
        let filters = ListFilters::default().column_filters(r#"[["role.title", "admin"]]"#);
        let compiled =
            compile_list(&registry, &user, &filters, &[], Pagination::page(3, 5)).unwrap();

        let page = compiled.page_sql();
        let count = compiled.count_sql();
        assert!(page.contains("LIMIT 5") && page.contains("OFFSET 10"), "{page}");
        for sql in [&page, &count] {
            assert!(sql.contains(r#""user__role"."title" ILIKE '%admin%'"#), "{sql}");
        }
        assert!(!count.contains("LIMIT"), "{count}");
    }

    #[test]
    fn default_search_fields_apply_when_none_requested() {
        let registry = registry();
        let user = registry.get("user").unwrap();
        assert_eq!(effective_search_fields(&user, &[]).to_vec(), vec!["email".to_string()]);
        let requested = vec!["role.title".to_string()];
        assert_eq!(effective_search_fields(&user, &requested), requested.as_slice());
    }

    #[test]
    fn include_hints_share_prefixes() {
        let registry = registry();
        let user = registry.get("user").unwrap();
        let hints = vec!["role".to_string(), "role".to_string()];
        let tree = IncludeTree::build(&registry, &user, &hints).unwrap();
        assert_eq!(tree.children.len(), 1);
        assert!(tree.children["role"].nested.is_empty());
    }

    #[test]
    fn include_hints_must_be_relationships() {
        let registry = registry();
        let user = registry.get("user").unwrap();
        for hint in ["email", "role.title", "nope", "role.role.role.role"] {
            let result = IncludeTree::build(&registry, &user, &[hint.to_string()]);
            assert!(
                matches!(result, Err(ListError::InvalidFieldPath { .. })),
                "{hint}"
            );
        }
    }
}
