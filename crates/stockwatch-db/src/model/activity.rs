use diesel::{pg::Pg, prelude::*};

use crate::{db::schema, model};

#[derive(Debug, Clone, PartialEq, Eq, Identifiable, Queryable, Selectable, Associations)]
#[diesel(table_name = schema::activity)]
#[diesel(check_for_backend(Pg))]
#[diesel(belongs_to(model::user::User, foreign_key = user_id))]
pub struct Activity {
    pub id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub day_key: String,
    pub day: chrono::NaiveDate,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::activity)]
pub struct NewActivity<'a> {
    pub id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub day_key: &'a str,
    pub day: chrono::NaiveDate,
}
