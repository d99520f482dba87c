#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Listing integration tests against PostgreSQL.
//!
//! Each test seeds its own schema through [`PgFixture`]. Tests return early
//! when `DATABASE_URL` is not set.

use std::collections::HashMap;

use rowsift_kernel::listing::{ListOutcome, ListResult, OutputShape, list_records};
use rowsift_test_utils::{PgFixture, assert};

fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn list(
    db: &PgFixture,
    entity: &str,
    raw: &[(&str, &str)],
    includes: &[&str],
) -> ListResult {
    let includes: Vec<String> = includes.iter().map(|s| s.to_string()).collect();
    let outcome = list_records(
        &db.context(),
        entity,
        &params(raw),
        &[],
        &includes,
        &OutputShape::Rows,
    )
    .await
    .unwrap();
    match outcome {
        ListOutcome::Found(result) => result,
        ListOutcome::NotFound => panic!("expected {entity} rows for {raw:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn search_total_counts_every_match() {
    let Some(db) = PgFixture::connect().await else {
        return;
    };

    let raw = [("searchTerm", "Bikes"), ("limit", "5")];
    let result = list(&db, "product", &raw, &[]).await;

    assert_eq!(result.total, 13);
    assert_eq!(result.rows.len(), 5);
    assert!(result.rows.iter().all(|row| row["category_id"] == 3));

    db.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn second_page_equals_skip_ten() {
    let Some(db) = PgFixture::connect().await else {
        return;
    };

    let by_page = list(&db, "product", &[("page", "2"), ("limit", "10")], &[]).await;
    let by_skip = list(&db, "product", &[("skip", "10"), ("limit", "10")], &[]).await;

    assert_eq!(assert::ids(&by_page.rows), (11..=20).collect::<Vec<i64>>());
    assert_eq!(by_page, by_skip);
    assert_eq!(by_page.total, 25);

    db.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn to_many_filters_return_each_entity_once() {
    let Some(db) = PgFixture::connect().await else {
        return;
    };

    let raw = [("columnFilters", r#"[["ratings.comment", "great"]]"#)];
    let result = list(&db, "product", &raw, &[]).await;

    assert_eq!(result.total, 5);
    assert_eq!(assert::ids(&result.rows), vec![1, 2, 3, 4, 5]);

    db.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn ranges_filter_real_rows() {
    let Some(db) = PgFixture::connect().await else {
        return;
    };

    let raw = [("numberRange", r#"["price", "100", "150"]"#)];
    let by_price = list(&db, "product", &raw, &[]).await;
    assert_eq!(assert::ids(&by_price.rows), (10..=15).collect::<Vec<i64>>());
    assert_eq!(by_price.total, 6);

    let raw = [("dateRange", r#"["created_at", "01-01-2025", "03-01-2025"]"#)];
    let by_date = list(&db, "product", &raw, &[]).await;
    assert_eq!(assert::ids(&by_date.rows), vec![1, 2, 3]);

    db.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn includes_are_loaded_in_the_listing_session() {
    let Some(db) = PgFixture::connect().await else {
        return;
    };

    let includes = ["category", "user.role"];
    let result = list(&db, "product", &[("limit", "3")], &includes).await;

    // product 1 -> Bikes, Bob Buyer (customer); product 2 -> Cars, Cy Seller (no role)
    assert_eq!(result.rows[0]["category"]["title"], "Bikes");
    assert_eq!(result.rows[0]["user"]["role"]["title"], "customer");
    assert_eq!(result.rows[1]["category"]["title"], "Cars");
    assert!(result.rows[1]["user"]["role"].is_null());
    assert_eq!(result.rows[2]["user"]["full_name"], "Ada Admin");

    db.cleanup().await;
}
