//! Query composition for `app_user`.

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::db::enums::TrackingStyle;
use crate::db::schema::app_user;
use crate::model::user::{NewUser, User};

/// ## Summary
/// Inserts a user and returns the stored row.
///
/// ## Errors
/// Returns an error if the database operation fails, including unique
/// violations on `telegram_id` or `username`.
pub async fn insert(conn: &mut AsyncPgConnection, user: &NewUser<'_>) -> QueryResult<User> {
    diesel::insert_into(app_user::table)
        .values(user)
        .returning(User::as_returning())
        .get_result(conn)
        .await
}

/// ## Errors
/// Returns an error if the database operation fails.
pub async fn find_by_id(conn: &mut AsyncPgConnection, id: Uuid) -> QueryResult<Option<User>> {
    app_user::table
        .find(id)
        .select(User::as_select())
        .first(conn)
        .await
        .optional()
}

/// ## Errors
/// Returns an error if the database operation fails.
pub async fn find_by_telegram_id(
    conn: &mut AsyncPgConnection,
    telegram_id: i64,
) -> QueryResult<Option<User>> {
    app_user::table
        .filter(app_user::telegram_id.eq(telegram_id))
        .select(User::as_select())
        .first(conn)
        .await
        .optional()
}

/// ## Summary
/// Returns every region that at least one user is bound to.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn distinct_regions(conn: &mut AsyncPgConnection) -> QueryResult<Vec<String>> {
    let mut regions: Vec<String> = app_user::table
        .filter(app_user::region.is_not_null())
        .select(app_user::region.assume_not_null())
        .distinct()
        .load(conn)
        .await?;
    regions.sort();
    Ok(regions)
}

/// ## Errors
/// Returns an error if the database operation fails.
pub async fn distinct_pincodes(conn: &mut AsyncPgConnection) -> QueryResult<Vec<String>> {
    let mut pincodes: Vec<String> = app_user::table
        .filter(app_user::pincode.is_not_null())
        .select(app_user::pincode.assume_not_null())
        .distinct()
        .load(conn)
        .await?;
    pincodes.sort();
    Ok(pincodes)
}

/// ## Summary
/// Finds any user in `region` that has a pincode, used to bootstrap a session.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn any_with_pincode_in_region(
    conn: &mut AsyncPgConnection,
    region: &str,
) -> QueryResult<Option<User>> {
    app_user::table
        .filter(app_user::region.eq(region))
        .filter(app_user::pincode.is_not_null())
        .select(User::as_select())
        .first(conn)
        .await
        .optional()
}

/// ## Errors
/// Returns an error if the database operation fails.
pub async fn update_location(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    pincode: &str,
    region: &str,
) -> QueryResult<Option<User>> {
    diesel::update(app_user::table.find(id))
        .set((
            app_user::pincode.eq(pincode),
            app_user::region.eq(region),
            app_user::updated_at.eq(diesel::dsl::now),
        ))
        .returning(User::as_returning())
        .get_result(conn)
        .await
        .optional()
}

/// ## Errors
/// Returns an error if the database operation fails.
pub async fn update_tracking_style(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    style: TrackingStyle,
) -> QueryResult<Option<User>> {
    diesel::update(app_user::table.find(id))
        .set((
            app_user::tracking_style.eq(style),
            app_user::updated_at.eq(diesel::dsl::now),
        ))
        .returning(User::as_returning())
        .get_result(conn)
        .await
        .optional()
}

/// ## Errors
/// Returns an error if the database operation fails.
pub async fn update_max_notify_count(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    max_notify_count: i32,
) -> QueryResult<Option<User>> {
    diesel::update(app_user::table.find(id))
        .set((
            app_user::max_notify_count.eq(max_notify_count),
            app_user::updated_at.eq(diesel::dsl::now),
        ))
        .returning(User::as_returning())
        .get_result(conn)
        .await
        .optional()
}

/// ## Errors
/// Returns an error if the database operation fails.
pub async fn update_favorite_skus(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    favorite_skus: &[String],
) -> QueryResult<usize> {
    diesel::update(app_user::table.find(id))
        .set((
            app_user::favorite_skus.eq(favorite_skus),
            app_user::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await
}

/// ## Summary
/// Deletes the user owning `telegram_id`, returning the removed row.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn delete_by_telegram_id(
    conn: &mut AsyncPgConnection,
    telegram_id: i64,
) -> QueryResult<Option<User>> {
    diesel::delete(app_user::table.filter(app_user::telegram_id.eq(telegram_id)))
        .returning(User::as_returning())
        .get_result(conn)
        .await
        .optional()
}

/// ## Errors
/// Returns an error if the database operation fails.
pub async fn count_all(conn: &mut AsyncPgConnection) -> QueryResult<i64> {
    app_user::table.count().get_result(conn).await
}

/// ## Errors
/// Returns an error if the database operation fails.
pub async fn admins(conn: &mut AsyncPgConnection) -> QueryResult<Vec<User>> {
    app_user::table
        .filter(app_user::is_admin.eq(true))
        .select(User::as_select())
        .load(conn)
        .await
}

/// ## Summary
/// Counts users that are not blocked and have a delivery address.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn count_reachable(conn: &mut AsyncPgConnection) -> QueryResult<i64> {
    app_user::table
        .filter(app_user::is_blocked.eq(false))
        .filter(app_user::telegram_id.is_not_null())
        .count()
        .get_result(conn)
        .await
}

/// ## Summary
/// Loads one page of reachable users ordered by id.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn page_reachable(
    conn: &mut AsyncPgConnection,
    offset: i64,
    limit: i64,
) -> QueryResult<Vec<User>> {
    app_user::table
        .filter(app_user::is_blocked.eq(false))
        .filter(app_user::telegram_id.is_not_null())
        .order(app_user::id.asc())
        .offset(offset)
        .limit(limit)
        .select(User::as_select())
        .load(conn)
        .await
}
