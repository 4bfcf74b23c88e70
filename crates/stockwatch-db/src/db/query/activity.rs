//! Query composition for `activity`.

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::db::schema::activity;
use crate::model::activity::NewActivity;

/// ## Summary
/// Records a user as active for a day. Repeated calls for the same day are no-ops.
///
/// ## Returns
/// The number of rows inserted (0 or 1).
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn record(conn: &mut AsyncPgConnection, entry: &NewActivity<'_>) -> QueryResult<usize> {
    diesel::insert_into(activity::table)
        .values(entry)
        .on_conflict((activity::day_key, activity::user_id))
        .do_nothing()
        .execute(conn)
        .await
}

/// ## Errors
/// Returns an error if the database operation fails.
pub async fn count_for_day(conn: &mut AsyncPgConnection, day_key: &str) -> QueryResult<i64> {
    activity::table
        .filter(activity::day_key.eq(day_key))
        .count()
        .get_result(conn)
        .await
}
