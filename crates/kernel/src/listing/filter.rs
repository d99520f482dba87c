//! Filter compilation.
//!
//! Turns a [`ListFilters`] bag into predicates on a [`QueryPlan`]. The blocks
//! run in a fixed order and two of them end compilation early:
//!
//! 1. search term: OR of substring matches over the search fields
//! 2. column filters: AND of pair predicates, then stop
//! 3. custom filters (only when there are no column filters): same, then stop
//! 4. number range
//! 5. date range
//!
//! So a request carrying both `columnFilters` and `numberRange` ignores the
//! range. Callers depend on this, so it stays.

use chrono::{DateTime, Utc};
use sea_query::{Cond, SimpleExpr};

use super::coerce::coerce;
use super::dates::{end_of_day, is_midnight, parse_date};
use super::query_builder::{self, QueryPlan};
use super::types::{FieldFilter, FilterValue, ListFilters};
use super::wire::{decode_date_range, decode_number_range, decode_pairs};
use crate::error::{ListError, ListOpResult};
use crate::schema::{ColumnType, EntitySchema, FieldPath, ResolvedField, SchemaRegistry};

/// Compiles filters for one root entity.
pub struct FilterCompiler<'a> {
    registry: &'a SchemaRegistry,
    schema: &'a EntitySchema,
    now: DateTime<Utc>,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(registry: &'a SchemaRegistry, schema: &'a EntitySchema) -> Self {
        Self {
            registry,
            schema,
            now: Utc::now(),
        }
    }

    /// Fix the instant an open-ended date range runs up to.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Apply `filters` to `plan`. Nothing is returned on error, so a failed
    /// compilation never leaves a partially filtered plan behind.
    pub fn apply(
        &self,
        plan: QueryPlan,
        search_fields: &[String],
        filters: &ListFilters,
    ) -> ListOpResult<QueryPlan> {
        let mut plan = plan;

        if let Some(term) = filters.search_term.as_deref().filter(|t| !t.is_empty()) {
            if !search_fields.is_empty() {
                plan = self.apply_search(plan, term, search_fields)?;
            }
        }

        if let Some(wire) = filters.column_filters.as_deref().filter(|w| !w.is_empty()) {
            let pairs = decode_pairs("columnFilters", wire)?;
            return self.apply_pairs(plan, &pairs);
        }

        if !filters.custom_filters.is_empty() {
            return self.apply_pairs(plan, &filters.custom_filters);
        }

        if let Some(wire) = filters.number_range.as_deref().filter(|w| !w.is_empty()) {
            plan = self.apply_number_range(plan, wire)?;
        }

        if let Some(wire) = filters.date_range.as_deref().filter(|w| !w.is_empty()) {
            plan = self.apply_date_range(plan, wire)?;
        }

        Ok(plan)
    }

    fn resolve(&self, field: &str) -> ListOpResult<ResolvedField> {
        let path = FieldPath::parse(field)?;
        self.registry.resolve(self.schema, &path)
    }

    fn apply_search(
        &self,
        plan: QueryPlan,
        term: &str,
        search_fields: &[String],
    ) -> ListOpResult<QueryPlan> {
        let mut any = Cond::any();
        let mut joins = Vec::new();
        for field in search_fields {
            let resolved = self.resolve(field)?;
            any = any.add(query_builder::contains(&resolved.column, term));
            joins.extend(resolved.joins);
        }
        Ok(plan.with_joins(joins).and_where(SimpleExpr::from(any)))
    }

    fn apply_pairs(&self, plan: QueryPlan, pairs: &[FieldFilter]) -> ListOpResult<QueryPlan> {
        let mut joins = Vec::new();
        let mut predicates = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let resolved = self.resolve(&pair.field)?;
            let value = coerce(&pair.field, resolved.column.column_type, &pair.value)?;
            predicates.push(match value {
                FilterValue::Text(text) => query_builder::contains(&resolved.column, &text),
                other => query_builder::equals(&resolved.column, other),
            });
            joins.extend(resolved.joins);
        }
        Ok(predicates
            .into_iter()
            .fold(plan.with_joins(joins), QueryPlan::and_where))
    }

    fn apply_number_range(&self, plan: QueryPlan, wire: &str) -> ListOpResult<QueryPlan> {
        let spec = decode_number_range(wire)?;
        let resolved = self.resolve(&spec.field)?;
        if !resolved.column.column_type.is_numeric() {
            return Err(ListError::invalid_value(
                &spec.field,
                wire,
                "numberRange needs a numeric column",
            ));
        }

        let bound = |raw: &serde_json::Value| coerce(&spec.field, ColumnType::Float, raw);
        let min = spec.min.as_ref().map(bound).transpose()?;
        let max = spec.max.as_ref().map(bound).transpose()?;

        let column = &resolved.column;
        let predicate = match (min, max) {
            (Some(low), Some(high)) => query_builder::between(column, low, high),
            (Some(low), None) => query_builder::at_least(column, low),
            (None, Some(high)) => query_builder::at_most(column, high),
            (None, None) => return Ok(plan),
        };
        Ok(plan.with_joins(resolved.joins).and_where(predicate))
    }

    fn apply_date_range(&self, plan: QueryPlan, wire: &str) -> ListOpResult<QueryPlan> {
        let spec = decode_date_range(wire)?;
        let resolved = self.resolve(&spec.field)?;
        if resolved.column.column_type != ColumnType::Timestamp {
            return Err(ListError::invalid_value(
                &spec.field,
                wire,
                "dateRange needs a timestamp column",
            ));
        }

        let start = parse_date(&spec.start)?;
        let end = match spec.end.as_deref() {
            Some(text) => parse_date(text)?,
            None => self.now,
        };
        let end = if is_midnight(&end) { end_of_day(&end) } else { end };

        let column = &resolved.column;
        Ok(plan
            .with_joins(resolved.joins)
            .and_where(query_builder::at_least(column, FilterValue::Timestamp(start)))
            .and_where(query_builder::at_most(column, FilterValue::Timestamp(end))))
    }
}

/// Apply `filters` to `plan` for `schema`, using the current time for
/// open-ended date ranges.
pub fn apply_filters(
    registry: &SchemaRegistry,
    schema: &EntitySchema,
    plan: QueryPlan,
    search_fields: &[String],
    filters: &ListFilters,
) -> ListOpResult<QueryPlan> {
    FilterCompiler::new(registry, schema).apply(plan, search_fields, filters)
}
