use diesel::{pg::Pg, prelude::*};
use serde::{Deserialize, Serialize};

use crate::{db::schema, model};

#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Identifiable,
    Queryable,
    Selectable,
    Associations,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = schema::tracked_product)]
#[diesel(check_for_backend(Pg))]
#[diesel(belongs_to(model::user::User, foreign_key = user_id))]
pub struct TrackedProduct {
    pub id: uuid::Uuid,
    pub sku: String,
    pub user_id: uuid::Uuid,
    pub remaining_notify_count: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::tracked_product)]
pub struct NewTrackedProduct<'a> {
    pub id: uuid::Uuid,
    pub sku: &'a str,
    pub user_id: uuid::Uuid,
    pub remaining_notify_count: i32,
}
