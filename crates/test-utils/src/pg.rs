//! Seeded PostgreSQL fixture.
//!
//! Each fixture creates its own schema, loads the shop tables into it and
//! points every pooled connection's `search_path` at it, so tests can run in
//! parallel against one database. Requires `DATABASE_URL`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sqlx::Executor;
use sqlx::postgres::{PgPool, PgPoolOptions};

use rowsift_kernel::ListContext;
use rowsift_kernel::db::PgBackend;
use rowsift_kernel::listing::ListLimits;

use crate::shop_registry;

static NEXT_SCHEMA: AtomicU32 = AtomicU32::new(0);

/// Shop tables, mirroring `config/shop-schema.toml`.
const SHOP_TABLES: &str = r#"
CREATE TABLE user_role (
    id integer PRIMARY KEY,
    title text NOT NULL,
    permissions jsonb
);
CREATE TABLE "user" (
    id integer PRIMARY KEY,
    full_name text NOT NULL,
    email text NOT NULL,
    password text NOT NULL,
    phone text,
    is_active boolean NOT NULL DEFAULT true,
    role_id integer REFERENCES user_role (id),
    created_at timestamptz NOT NULL DEFAULT now(),
    updated_at timestamptz NOT NULL DEFAULT now()
);
CREATE TABLE category (
    id integer PRIMARY KEY,
    title text NOT NULL,
    description text,
    parent_id integer REFERENCES category (id),
    created_at timestamptz NOT NULL DEFAULT now(),
    updated_at timestamptz NOT NULL DEFAULT now()
);
CREATE TABLE product (
    id integer PRIMARY KEY,
    user_id integer REFERENCES "user" (id),
    category_id integer REFERENCES category (id),
    title text NOT NULL,
    description text,
    images jsonb,
    price double precision NOT NULL,
    sale_price double precision,
    stock integer NOT NULL DEFAULT 0,
    is_active boolean NOT NULL DEFAULT true,
    created_at timestamptz NOT NULL DEFAULT now(),
    updated_at timestamptz NOT NULL DEFAULT now()
);
CREATE TABLE rating (
    id integer PRIMARY KEY,
    score integer NOT NULL,
    comment text,
    product_id integer REFERENCES product (id),
    user_id integer REFERENCES "user" (id),
    created_at timestamptz NOT NULL DEFAULT now()
);
"#;

/// Shop rows: 2 roles, 3 users, 4 categories, 25 products, 30 ratings.
///
/// Odd products are in "Bikes" (13 of them), even ones in "Cars".
/// Ratings 1-10 say "great value" and belong two apiece to products 1-5.
const SHOP_ROWS: &str = r#"
INSERT INTO user_role (id, title) VALUES (1, 'admin'), (2, 'customer');
INSERT INTO "user" (id, full_name, email, password, role_id) VALUES
    (1, 'Ada Admin', 'ada@example.com', 'x', 1),
    (2, 'Bob Buyer', 'bob@example.com', 'x', 2),
    (3, 'Cy Seller', 'cy@example.com', 'x', NULL);
INSERT INTO category (id, title, parent_id) VALUES
    (1, 'Vehicles', NULL),
    (2, 'Cars', 1),
    (3, 'Bikes', 1),
    (4, 'Books', NULL);
INSERT INTO product (id, user_id, category_id, title, price, stock, is_active, created_at)
SELECT i, (i % 3) + 1, (i % 2) + 2, 'Product ' || i, i * 10.0, i % 4, i % 2 = 0,
       timestamptz '2025-01-01 00:00:00+00' + (i - 1) * interval '1 day'
FROM generate_series(1, 25) AS i;
INSERT INTO rating (id, score, comment, product_id, user_id)
SELECT i, (i % 5) + 1,
       CASE WHEN i <= 10 THEN 'great value' ELSE 'fine' END,
       ((i - 1) / 2) + 1, (i % 3) + 1
FROM generate_series(1, 30) AS i;
"#;

/// A pool bound to a freshly seeded schema.
pub struct PgFixture {
    pub pool: PgPool,
    schema: String,
}

impl PgFixture {
    /// Create and seed a schema, or `None` when `DATABASE_URL` is unset.
    ///
    /// # Panics
    ///
    /// Panics if the database is configured but cannot be reached or seeded.
    pub async fn connect() -> Option<Self> {
        dotenvy::dotenv().ok();
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL is not set; skipping PostgreSQL test");
            return None;
        };

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or_default();
        let schema = format!(
            "rowsift_test_{}_{}_{nanos}",
            std::process::id(),
            NEXT_SCHEMA.fetch_add(1, Ordering::Relaxed)
        );

        let search_path = format!("SET search_path TO {schema}");
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .after_connect(move |conn, _meta| {
                let search_path = search_path.clone();
                Box::pin(async move {
                    conn.execute(search_path.as_str()).await?;
                    Ok(())
                })
            })
            .connect(&url)
            .await
            .unwrap_or_else(|err| panic!("failed to connect to {url}: {err}"));

        let create = format!("CREATE SCHEMA {schema}");
        let seeded = match sqlx::query(&create).execute(&pool).await {
            Ok(_) => sqlx::raw_sql(&format!("{SHOP_TABLES}\n{SHOP_ROWS}"))
                .execute(&pool)
                .await
                .map(|_| ()),
            Err(err) => Err(err),
        };
        if let Err(err) = seeded {
            panic!("failed to seed schema {schema}: {err}");
        }

        Some(Self { pool, schema })
    }

    /// Listing context over the seeded schema.
    pub fn context(&self) -> ListContext {
        ListContext::new(
            shop_registry(),
            Arc::new(PgBackend::new(self.pool.clone(), Duration::from_secs(5))),
            ListLimits::default(),
        )
    }

    /// Drop the schema and close the pool.
    pub async fn cleanup(self) {
        let drop = format!("DROP SCHEMA IF EXISTS {} CASCADE", self.schema);
        sqlx::query(&drop).execute(&self.pool).await.ok();
        self.pool.close().await;
    }
}
