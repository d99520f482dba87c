//! Result projection.
//!
//! Rows leave the executor as flat JSON objects. Projection either trims their
//! keys or rebuilds a parent/child forest from `id`/`parent_id` columns.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use super::types::{OutputShape, TreeShape};

/// Forest rebuilt from flat rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forest {
    /// Rows whose parent is null, with their descendants nested.
    pub roots: Vec<Value>,
    /// Rows whose parent is missing from the input, or is the row itself.
    /// Their own descendants are still nested under them.
    pub detached: Vec<Value>,
}

/// Apply `shape` to a page of rows.
pub fn project(rows: Vec<Value>, shape: &OutputShape) -> Vec<Value> {
    match shape {
        OutputShape::Rows => rows,
        OutputShape::Fields(keep) => rows
            .into_iter()
            .map(|row| retain_keys(row, |key| keep.iter().any(|k| k == key)))
            .collect(),
        OutputShape::Omit(drop) => rows
            .into_iter()
            .map(|row| retain_keys(row, |key| !drop.iter().any(|k| k == key)))
            .collect(),
        OutputShape::Tree(tree) => build_forest(rows, tree).roots,
    }
}

fn retain_keys(row: Value, keep: impl Fn(&str) -> bool) -> Value {
    match row {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| keep(key))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

/// Rebuild a forest from rows carrying an id and a nullable parent id.
///
/// Children keep the order the rows arrived in. A row whose parent id equals
/// its own id, or whose parent is not among the rows, is detached rather than
/// dropped. Rows with a repeated id are attached once.
pub fn build_forest(rows: Vec<Value>, shape: &TreeShape) -> Forest {
    let keys: Vec<Option<String>> = rows
        .iter()
        .map(|row| node_key(row.get(&shape.id_field)))
        .collect();

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(rows.len());
    for (i, key) in keys.iter().enumerate() {
        if let Some(key) = key {
            index.entry(key.as_str()).or_insert(i);
        }
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); rows.len()];
    let mut roots = Vec::new();
    let mut detached = Vec::new();
    let mut seen_roots: HashSet<&str> = HashSet::new();

    for (i, row) in rows.iter().enumerate() {
        let own = keys[i].as_deref();
        let Some(parent) = node_key(row.get(&shape.parent_field)) else {
            let fresh = own.is_none_or(|key| seen_roots.insert(key));
            if fresh {
                roots.push(i);
            }
            continue;
        };

        if own == Some(parent.as_str()) {
            detached.push(i);
            continue;
        }

        match index.get(parent.as_str()) {
            Some(&p) => {
                let duplicate = own.is_some()
                    && children[p].iter().any(|&c| keys[c].as_deref() == own);
                if !duplicate {
                    children[p].push(i);
                }
            }
            None => detached.push(i),
        }
    }

    let mut visiting = vec![false; rows.len()];
    let mut materialize = |i: usize| nest(i, &rows, &children, shape, &mut visiting);
    Forest {
        roots: roots.into_iter().map(&mut materialize).collect(),
        detached: detached.into_iter().map(&mut materialize).collect(),
    }
}

/// Clone row `i` with its children nested. `visiting` breaks cycles.
fn nest(
    i: usize,
    rows: &[Value],
    children: &[Vec<usize>],
    shape: &TreeShape,
    visiting: &mut [bool],
) -> Value {
    let mut row = rows[i].clone();
    if visiting[i] {
        return row;
    }
    visiting[i] = true;

    let mut nested = Vec::with_capacity(children[i].len());
    for &c in &children[i] {
        if !visiting[c] {
            nested.push(nest(c, rows, children, shape, visiting));
        }
    }

    if let Value::Object(map) = &mut row {
        let mut list = match map.remove(&shape.children_field) {
            Some(Value::Array(existing)) => existing,
            _ => Vec::new(),
        };
        for child in nested {
            let key = node_key(child.get(&shape.id_field));
            let present = key.is_some()
                && list
                    .iter()
                    .any(|c| node_key(c.get(&shape.id_field)) == key);
            if !present {
                list.push(child);
            }
        }
        map.insert(shape.children_field.clone(), Value::Array(list));
    }

    visiting[i] = false;
    row
}

fn node_key(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}
