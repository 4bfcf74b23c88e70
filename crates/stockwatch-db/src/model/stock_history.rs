use diesel::{pg::Pg, prelude::*};

use crate::db::schema;

#[derive(Debug, Clone, PartialEq, Eq, Identifiable, Queryable, Selectable)]
#[diesel(table_name = schema::product_stock_history)]
#[diesel(check_for_backend(Pg))]
pub struct StockHistory {
    pub id: uuid::Uuid,
    pub sku: String,
    pub region: String,
    pub last_seen_in_stock_at: chrono::DateTime<chrono::Utc>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::product_stock_history)]
pub struct NewStockHistory<'a> {
    pub id: uuid::Uuid,
    pub sku: &'a str,
    pub region: &'a str,
    pub last_seen_in_stock_at: chrono::DateTime<chrono::Utc>,
}
