//! Query composition for `product_stock_history`.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::db::schema::product_stock_history;
use crate::model::stock_history::{NewStockHistory, StockHistory};

/// ## Summary
/// Records that `sku` was purchasable in `region` at `seen_at`. Inserts on
/// first sight, otherwise only the timestamp moves.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn touch(
    conn: &mut AsyncPgConnection,
    sku: &str,
    region: &str,
    seen_at: DateTime<Utc>,
) -> QueryResult<usize> {
    diesel::insert_into(product_stock_history::table)
        .values(&NewStockHistory {
            id: uuid::Uuid::now_v7(),
            sku,
            region,
            last_seen_in_stock_at: seen_at,
        })
        .on_conflict((product_stock_history::sku, product_stock_history::region))
        .do_update()
        .set((
            product_stock_history::last_seen_in_stock_at.eq(seen_at),
            product_stock_history::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await
}

/// ## Errors
/// Returns an error if the database operation fails.
pub async fn find(
    conn: &mut AsyncPgConnection,
    sku: &str,
    region: &str,
) -> QueryResult<Option<StockHistory>> {
    product_stock_history::table
        .filter(product_stock_history::sku.eq(sku))
        .filter(product_stock_history::region.eq(region))
        .select(StockHistory::as_select())
        .first(conn)
        .await
        .optional()
}
