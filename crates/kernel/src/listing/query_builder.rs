//! Listing query plans using SeaQuery.
//!
//! A [`QueryPlan`] is an immutable value: every composition step consumes the
//! plan and returns a new one, so no builder state is shared between steps or
//! requests. Rendering produces SeaQuery statements for:
//! - the page (root rows, ordered by primary key, with OFFSET/LIMIT)
//! - the total (COUNT over the same filtered rows, no pagination)

use sea_query::extension::postgres::PgExpr;
use sea_query::{
    Alias, Asterisk, Expr, Func, JoinType, Order, PostgresQueryBuilder, Query, SelectStatement,
    SimpleExpr, Value,
};

use super::types::FilterValue;
use crate::schema::{Cardinality, ColumnRef, EntitySchema, JoinStep};

/// Composable description of one listing query.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    table: String,
    primary_key: String,
    joins: Vec<JoinStep>,
    predicates: Vec<SimpleExpr>,
    offset: Option<u64>,
    limit: Option<u64>,
}

impl QueryPlan {
    /// Base scan over `schema`'s table.
    pub fn new(schema: &EntitySchema) -> Self {
        Self {
            table: schema.table_name().to_string(),
            primary_key: schema.primary_key.clone(),
            joins: Vec::new(),
            predicates: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    /// Add left outer joins. A join whose alias is already planned is skipped.
    pub fn with_joins(mut self, joins: impl IntoIterator<Item = JoinStep>) -> Self {
        for join in joins {
            if !self.joins.iter().any(|planned| planned.alias == join.alias) {
                self.joins.push(join);
            }
        }
        self
    }

    /// AND a predicate into the plan.
    pub fn and_where(mut self, predicate: SimpleExpr) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn paginate(mut self, offset: u64, limit: u64) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    pub fn joins(&self) -> &[JoinStep] {
        &self.joins
    }

    pub fn predicate_count(&self) -> usize {
        self.predicates.len()
    }

    /// Whether a planned join can repeat root rows.
    pub fn fans_out(&self) -> bool {
        self.joins
            .iter()
            .any(|join| join.cardinality == Cardinality::Many)
    }

    /// SELECT of the root rows, ordered and paginated.
    pub fn select_statement(&self) -> SelectStatement {
        let mut query = self.matching_statement();
        query.order_by(
            (Alias::new(&self.table), Alias::new(&self.primary_key)),
            Order::Asc,
        );
        if let Some(limit) = self.limit {
            query.limit(limit);
        }
        if let Some(offset) = self.offset {
            query.offset(offset);
        }
        query
    }

    /// COUNT(*) over every root row the filters match, ignoring pagination.
    pub fn count_statement(&self) -> SelectStatement {
        let mut query = Query::select();
        query
            .expr(Expr::col(Asterisk).count())
            .from_subquery(self.matching_statement(), Alias::new("matched"));
        query
    }

    pub fn to_sql(&self) -> String {
        self.select_statement().to_string(PostgresQueryBuilder)
    }

    pub fn count_sql(&self) -> String {
        self.count_statement().to_string(PostgresQueryBuilder)
    }

    /// Root rows matching every predicate, without order or pagination.
    ///
    /// With a to-many join in the plan, root rows are selected by primary key
    /// from the joined sub-select so each entity appears once.
    fn matching_statement(&self) -> SelectStatement {
        let root = Alias::new(&self.table);
        let mut query = Query::select();
        query.column((root.clone(), Asterisk)).from(root.clone());

        if self.fans_out() {
            let mut matched = Query::select();
            matched
                .column((root.clone(), Alias::new(&self.primary_key)))
                .from(root.clone());
            self.add_joins(&mut matched);
            self.add_predicates(&mut matched);
            query.and_where(Expr::col((root, Alias::new(&self.primary_key))).in_subquery(matched));
        } else {
            self.add_joins(&mut query);
            self.add_predicates(&mut query);
        }

        query
    }

    fn add_joins(&self, query: &mut SelectStatement) {
        for join in &self.joins {
            let on_condition = Expr::col((
                Alias::new(&join.from_alias),
                Alias::new(&join.local_column),
            ))
            .equals((Alias::new(&join.alias), Alias::new(&join.foreign_column)));

            query.join_as(
                JoinType::LeftJoin,
                Alias::new(&join.table),
                Alias::new(&join.alias),
                on_condition,
            );
        }
    }

    fn add_predicates(&self, query: &mut SelectStatement) {
        for predicate in &self.predicates {
            query.and_where(predicate.clone());
        }
    }
}

/// Expression for a resolved column.
pub fn column_expr(column: &ColumnRef) -> Expr {
    Expr::col((Alias::new(&column.table_alias), Alias::new(&column.column)))
}

/// Case-insensitive substring match. Non-text columns are matched through
/// their text form.
pub fn contains(column: &ColumnRef, needle: &str) -> SimpleExpr {
    let pattern = format!("%{}%", escape_like_wildcards(needle));
    if column.column_type.is_textual() {
        column_expr(column).ilike(pattern)
    } else {
        Expr::expr(Func::cast_as(column_expr(column), Alias::new("text"))).ilike(pattern)
    }
}

pub fn equals(column: &ColumnRef, value: FilterValue) -> SimpleExpr {
    column_expr(column).eq(Value::from(value))
}

pub fn at_least(column: &ColumnRef, value: FilterValue) -> SimpleExpr {
    column_expr(column).gte(Value::from(value))
}

pub fn at_most(column: &ColumnRef, value: FilterValue) -> SimpleExpr {
    column_expr(column).lte(Value::from(value))
}

pub fn between(column: &ColumnRef, low: FilterValue, high: FilterValue) -> SimpleExpr {
    column_expr(column).between(Value::from(low), Value::from(high))
}

/// `column IN (values)`, used for batched loading of related rows.
pub fn one_of(column: &ColumnRef, values: Vec<Value>) -> SimpleExpr {
    column_expr(column).is_in(values)
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnType, EntitySchema};

    fn product() -> EntitySchema {
        EntitySchema::new("product")
            .column("id", ColumnType::Integer)
            .column("title", ColumnType::String)
            .column("stock", ColumnType::Integer)
    }

    fn col(alias: &str, column: &str, column_type: ColumnType) -> ColumnRef {
        ColumnRef {
            table_alias: alias.to_string(),
            column: column.to_string(),
            column_type,
        }
    }

    fn join(alias: &str, table: &str, cardinality: Cardinality) -> JoinStep {
        JoinStep {
            alias: alias.to_string(),
            table: table.to_string(),
            from_alias: "product".to_string(),
            local_column: "category_id".to_string(),
            foreign_column: "id".to_string(),
            cardinality,
        }
    }

    #[test]
    fn base_scan_is_ordered_by_primary_key() {
        let sql = QueryPlan::new(&product()).to_sql();
        assert!(sql.contains(r#"SELECT "product".* FROM "product""#), "{sql}");
        assert!(sql.contains(r#"ORDER BY "product"."id" ASC"#), "{sql}");
        assert!(!sql.contains("WHERE"), "{sql}");
        assert!(!sql.contains("LIMIT"), "{sql}");
    }

    #[test]
    fn pagination_offset_and_limit() {
        let sql = QueryPlan::new(&product()).paginate(20, 10).to_sql();
        assert!(sql.contains("LIMIT 10"), "{sql}");
        assert!(sql.contains("OFFSET 20"), "{sql}");
    }

    #[test]
    fn count_ignores_pagination() {
        let plan = QueryPlan::new(&product())
            .and_where(equals(
                &col("product", "stock", ColumnType::Integer),
                FilterValue::Integer(3),
            ))
            .paginate(20, 10);
        let sql = plan.count_sql();
        assert!(sql.contains("COUNT(*)"), "{sql}");
        assert!(sql.contains(r#""stock" = 3"#), "{sql}");
        assert!(!sql.contains("LIMIT"), "{sql}");
        assert!(!sql.contains("OFFSET"), "{sql}");
    }

    #[test]
    fn composition_returns_new_plans() {
        let base = QueryPlan::new(&product());
        let filtered = base.clone().and_where(equals(
            &col("product", "stock", ColumnType::Integer),
            FilterValue::Integer(1),
        ));
        assert_eq!(base.predicate_count(), 0);
        assert_eq!(filtered.predicate_count(), 1);
    }

    #[test]
    fn left_join_on_relationship_columns() {
        let plan = QueryPlan::new(&product())
            .with_joins([join("product__category", "category", Cardinality::One)]);
        let sql = plan.to_sql();
        let expected = concat!(
            r#"LEFT JOIN "category" AS "product__category" "#,
            r#"ON "product"."category_id" = "product__category"."id""#
        );
        assert!(sql.contains(expected), "{sql}");
        assert!(!sql.contains(" IN "), "{sql}");
    }

    #[test]
    fn repeated_joins_are_planned_once() {
        let plan = QueryPlan::new(&product())
            .with_joins([join("product__category", "category", Cardinality::One)])
            .with_joins([join("product__category", "category", Cardinality::One)]);
        assert_eq!(plan.joins().len(), 1);
        assert_eq!(plan.to_sql().matches("LEFT JOIN").count(), 1);
    }

    #[test]
    fn to_many_joins_select_roots_by_key() {
        let plan = QueryPlan::new(&product())
            .with_joins([join("product__ratings", "rating", Cardinality::Many)])
            .and_where(equals(
                &col("product__ratings", "score", ColumnType::Integer),
                FilterValue::Integer(5),
            ));
        assert!(plan.fans_out());
        let sql = plan.to_sql();
        assert!(
            sql.contains(r#""product"."id" IN (SELECT "product"."id" FROM "product" LEFT JOIN"#),
            "{sql}"
        );
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let expr = contains(&col("product", "title", ColumnType::String), "car");
        let sql = QueryPlan::new(&product()).and_where(expr).to_sql();
        assert!(sql.contains("ILIKE"), "{sql}");
        assert!(sql.contains("%car%"), "{sql}");
    }

    #[test]
    fn substring_match_on_numbers_casts_to_text() {
        let expr = contains(&col("product", "stock", ColumnType::Integer), "12");
        let sql = QueryPlan::new(&product()).and_where(expr).to_sql();
        assert!(sql.contains(r#"CAST("product"."stock" AS text)"#), "{sql}");
    }

    #[test]
    fn range_predicates() {
        let stock = col("product", "stock", ColumnType::Integer);
        let sql = QueryPlan::new(&product())
            .and_where(between(&stock, FilterValue::Integer(1), FilterValue::Integer(5)))
            .to_sql();
        assert!(sql.contains(r#""stock" BETWEEN 1 AND 5"#), "{sql}");

        let sql = QueryPlan::new(&product())
            .and_where(at_least(&stock, FilterValue::Float(1.5)))
            .and_where(at_most(&stock, FilterValue::Float(9.5)))
            .to_sql();
        assert!(sql.contains(">= 1.5"), "{sql}");
        assert!(sql.contains("<= 9.5"), "{sql}");
    }

    #[test]
    fn batched_membership() {
        let id = col("product", "id", ColumnType::Integer);
        let sql = QueryPlan::new(&product())
            .and_where(one_of(&id, vec![Value::from(1_i64), Value::from(2_i64)]))
            .to_sql();
        assert!(sql.contains(r#""product"."id" IN (1, 2)"#), "{sql}");
    }

    #[test]
    fn like_wildcards_escaped() {
        let expr = contains(&col("product", "title", ColumnType::String), "100%_done");
        let sql = QueryPlan::new(&product()).and_where(expr).to_sql();
        assert!(
            sql.contains("100\\\\%\\\\_done") || sql.contains("100\\%\\_done"),
            "LIKE wildcards should be escaped: {sql}"
        );
        assert!(!sql.contains("%100%_done%"), "{sql}");
    }

    #[test]
    fn escape_like_wildcards_function() {
        assert_eq!(super::escape_like_wildcards("hello"), "hello");
        assert_eq!(super::escape_like_wildcards("100%"), "100\\%");
        assert_eq!(super::escape_like_wildcards("a_b"), "a\\_b");
        assert_eq!(super::escape_like_wildcards("a\\b"), "a\\\\b");
    }
}
