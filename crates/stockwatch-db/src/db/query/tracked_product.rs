//! Query composition for `tracked_product`.

use diesel::dsl::count_star;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_builder::QueryFragment;
use diesel::sql_types::Text;
use diesel_async::methods::{ExecuteDsl, LoadQuery};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::db::schema::{app_user, tracked_product};
use crate::model::tracked_product::{NewTrackedProduct, TrackedProduct};
use crate::model::user::User;

diesel::allow_columns_to_appear_in_same_group_by_clause!(app_user::region, tracked_product::sku);

/// ## Errors
/// Returns an error if the database operation fails.
pub async fn find(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    sku: &str,
) -> QueryResult<Option<TrackedProduct>> {
    tracked_product::table
        .filter(tracked_product::sku.eq(sku))
        .filter(tracked_product::user_id.eq(user_id))
        .select(TrackedProduct::as_select())
        .first(conn)
        .await
        .optional()
}

/// ## Errors
/// Returns an error if the database operation fails.
pub async fn list_for_user(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
) -> QueryResult<Vec<TrackedProduct>> {
    tracked_product::table
        .filter(tracked_product::user_id.eq(user_id))
        .order(tracked_product::created_at.asc())
        .select(TrackedProduct::as_select())
        .load(conn)
        .await
}

/// ## Summary
/// Inserts a tracking record unless one already exists for `(sku, user_id)`.
///
/// ## Returns
/// - `Ok(Some(record))` when the record was created
/// - `Ok(None)` when the pair was already tracked
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn insert_if_absent(
    conn: &mut AsyncPgConnection,
    record: &NewTrackedProduct<'_>,
) -> QueryResult<Option<TrackedProduct>> {
    diesel::insert_into(tracked_product::table)
        .values(record)
        .on_conflict((tracked_product::sku, tracked_product::user_id))
        .do_nothing()
        .returning(TrackedProduct::as_returning())
        .get_result(conn)
        .await
        .optional()
}

/// ## Errors
/// Returns an error if the database operation fails.
pub async fn delete(conn: &mut AsyncPgConnection, user_id: Uuid, sku: &str) -> QueryResult<usize> {
    diesel::delete(
        tracked_product::table
            .filter(tracked_product::sku.eq(sku))
            .filter(tracked_product::user_id.eq(user_id)),
    )
    .execute(conn)
    .await
}

/// ## Errors
/// Returns an error if the database operation fails.
pub async fn delete_by_user(conn: &mut AsyncPgConnection, user_id: Uuid) -> QueryResult<usize> {
    diesel::delete(tracked_product::table.filter(tracked_product::user_id.eq(user_id)))
        .execute(conn)
        .await
}

/// ## Summary
/// Decrements the budget of one record. Records already at zero are left
/// untouched, so the counter never goes negative.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn decrement(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    sku: &str,
) -> QueryResult<Option<TrackedProduct>> {
    decrement_query(user_id, sku)
        .get_result(conn)
        .await
        .optional()
}

/// `UPDATE ... RETURNING` behind [`decrement`].
#[must_use]
pub fn decrement_query(
    user_id: Uuid,
    sku: &str,
) -> impl LoadQuery<'_, AsyncPgConnection, TrackedProduct> + QueryFragment<Pg> {
    diesel::update(
        tracked_product::table
            .filter(tracked_product::sku.eq(sku))
            .filter(tracked_product::user_id.eq(user_id))
            .filter(tracked_product::remaining_notify_count.gt(0)),
    )
    .set((
        tracked_product::remaining_notify_count.eq(tracked_product::remaining_notify_count - 1),
        tracked_product::updated_at.eq(diesel::dsl::now),
    ))
    .returning(TrackedProduct::as_returning())
}

/// ## Summary
/// Resets the budget of every record on `sku` owned by an `always` user to
/// that user's `max_notify_count`, in a single statement.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn rearm_always(conn: &mut AsyncPgConnection, sku: &str) -> QueryResult<usize> {
    rearm_always_query(sku).execute(conn).await
}

#[must_use]
pub fn rearm_always_query(sku: &str) -> impl ExecuteDsl<AsyncPgConnection> + QueryFragment<Pg> {
    diesel::sql_query(
        "UPDATE tracked_product AS tp \
         SET remaining_notify_count = u.max_notify_count, updated_at = now() \
         FROM app_user AS u \
         WHERE tp.user_id = u.id AND tp.sku = $1 AND u.tracking_style = 'always'",
    )
    .bind::<Text, _>(sku)
}

/// ## Summary
/// Loads tracking records on `skus` that still have budget, joined to owners
/// bound to `region`.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn notify_candidates(
    conn: &mut AsyncPgConnection,
    skus: &[String],
    region: &str,
) -> QueryResult<Vec<(TrackedProduct, User)>> {
    if skus.is_empty() {
        return Ok(Vec::new());
    }

    notify_candidates_query(skus, region).load(conn).await
}

/// Records are ordered by sku, then oldest first.
#[must_use]
pub fn notify_candidates_query<'a>(
    skus: &'a [String],
    region: &'a str,
) -> impl LoadQuery<'a, AsyncPgConnection, (TrackedProduct, User)> + QueryFragment<Pg> {
    tracked_product::table
        .inner_join(app_user::table)
        .filter(tracked_product::sku.eq_any(skus))
        .filter(tracked_product::remaining_notify_count.gt(0))
        .filter(app_user::region.eq(region))
        .order((tracked_product::sku.asc(), tracked_product::created_at.asc()))
        .select((TrackedProduct::as_select(), User::as_select()))
}

/// ## Summary
/// Counts tracking records per `(region, sku)`, attributing each record to
/// its owner's region. Owners without a region are left out.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn sku_counts_by_region(
    conn: &mut AsyncPgConnection,
) -> QueryResult<Vec<(Option<String>, String, i64)>> {
    sku_counts_by_region_query().load(conn).await
}

#[must_use]
pub fn sku_counts_by_region_query()
-> impl LoadQuery<'static, AsyncPgConnection, (Option<String>, String, i64)> + QueryFragment<Pg> {
    tracked_product::table
        .inner_join(app_user::table)
        .filter(app_user::region.is_not_null())
        .group_by((app_user::region, tracked_product::sku))
        .select((app_user::region, tracked_product::sku, count_star()))
}

#[cfg(test)]
mod tests {
    use diesel::debug_query;

    use super::*;

    #[test]
    fn decrement_only_matches_records_with_budget() {
        let user_id = Uuid::now_v7();
        let sql = debug_query::<Pg, _>(&decrement_query(user_id, "P1")).to_string();

        assert!(sql.starts_with(r#"UPDATE "tracked_product" SET "#), "{sql}");
        assert!(sql.contains(r#""remaining_notify_count" - $1"#), "{sql}");
        assert!(sql.contains(r#""updated_at" = CURRENT_TIMESTAMP"#), "{sql}");
        assert!(sql.contains(r#""tracked_product"."sku" = $2"#), "{sql}");
        assert!(sql.contains(r#""tracked_product"."user_id" = $3"#), "{sql}");
        assert!(sql.contains(r#""tracked_product"."remaining_notify_count" > $4"#), "{sql}");
        assert!(sql.contains("RETURNING"), "{sql}");
        assert!(sql.contains(&format!(r#"binds: [1, "P1", {user_id:?}, 0]"#)), "{sql}");
    }

    #[test]
    fn rearm_touches_always_owners_of_one_sku() {
        let sql = debug_query::<Pg, _>(&rearm_always_query("P1")).to_string();

        assert!(sql.contains("SET remaining_notify_count = u.max_notify_count"), "{sql}");
        assert!(sql.contains("tp.user_id = u.id"), "{sql}");
        assert!(sql.contains("tp.sku = $1"), "{sql}");
        assert!(sql.contains("u.tracking_style = 'always'"), "{sql}");
        assert!(sql.ends_with(r#"-- binds: ["P1"]"#), "{sql}");
    }

    #[test]
    fn candidates_are_gated_by_budget_and_region() {
        let skus = vec!["P1".to_string(), "P2".to_string()];
        let sql = debug_query::<Pg, _>(&notify_candidates_query(&skus, "delhi")).to_string();

        assert!(sql.contains(r#"INNER JOIN "app_user""#), "{sql}");
        assert!(sql.contains(r#""tracked_product"."user_id" = "app_user"."id""#), "{sql}");
        assert!(sql.contains(r#""tracked_product"."sku" = ANY($1)"#), "{sql}");
        assert!(sql.contains(r#""tracked_product"."remaining_notify_count" > $2"#), "{sql}");
        assert!(sql.contains(r#""app_user"."region" = $3"#), "{sql}");
        assert!(sql.contains(r#"ORDER BY "tracked_product"."sku" ASC, "tracked_product"."created_at" ASC"#), "{sql}");
        assert!(sql.contains(r#"binds: [["P1", "P2"], 0, "delhi"]"#), "{sql}");
    }

    #[test]
    fn sku_counts_group_by_owner_region() {
        let sql = debug_query::<Pg, _>(&sku_counts_by_region_query()).to_string();

        assert!(sql.contains("COUNT(*)"), "{sql}");
        assert!(sql.contains(r#""app_user"."region" IS NOT NULL"#), "{sql}");
        assert!(sql.contains(r#"GROUP BY "app_user"."region", "tracked_product"."sku""#), "{sql}");
    }
}
