mod common;

use std::sync::Arc;

use common::{harness, product, user_in};
use stockwatch_service::analytics::TrackingAnalytics;
use stockwatch_service::store::{Store, TrackingStore};

fn analytics(h: &common::Harness) -> TrackingAnalytics {
    TrackingAnalytics::new(
        Arc::clone(&h.store) as Arc<dyn Store>,
        Arc::clone(&h.sessions),
    )
}

#[test_log::test(tokio::test)]
async fn report_ranks_regions_and_names_products() {
    let h = harness();
    h.upstream.serve("110001", "delhi");
    h.upstream.serve("400001", "mumbai");
    h.upstream.set_catalog("delhi", vec![product("P1", 1, 5, 0)]);
    let a = user_in(&h.store, Some(1), "110001", "delhi").await;
    let b = user_in(&h.store, Some(2), "110001", "delhi").await;
    let c = user_in(&h.store, Some(3), "400001", "mumbai").await;
    h.store.track(a.id, "P1").await.unwrap();
    h.store.track(b.id, "P1").await.unwrap();
    h.store.track(b.id, "P7").await.unwrap();
    h.store.track(c.id, "P1").await.unwrap();
    h.sessions.connect("110001").await.unwrap();

    let messages = analytics(&h).tracked_products_report().await.unwrap();

    assert_eq!(
        messages,
        vec![
            "📍 <b>delhi</b> (3)\n- <b>Product P1</b> (2)\n- <b>P7</b> (1)\n\n\
             📍 <b>mumbai</b> (1)\nNo active session found for this region."
                .to_string()
        ]
    );
    // Only the explicit connect above reached upstream.
    assert_eq!(h.upstream.connects(), 1);
}

#[test_log::test(tokio::test)]
async fn report_without_tracking() {
    let h = harness();
    user_in(&h.store, Some(1), "110001", "delhi").await;

    let messages = analytics(&h).tracked_products_report().await.unwrap();

    assert_eq!(messages, vec!["No products are being tracked.".to_string()]);
}

#[test_log::test(tokio::test)]
async fn counts_are_exposed_per_region() {
    let h = harness();
    let a = user_in(&h.store, Some(1), "110001", "delhi").await;
    let b = user_in(&h.store, Some(2), "400001", "mumbai").await;
    h.store.track(a.id, "P1").await.unwrap();
    h.store.track(b.id, "P1").await.unwrap();
    h.store.track(b.id, "P2").await.unwrap();

    let counts = h.store.tracked_sku_counts().await.unwrap();

    assert_eq!(counts[0].region.as_str(), "mumbai");
    assert_eq!(counts[0].total, 2);
    assert_eq!(counts[1].region.as_str(), "delhi");
    assert_eq!(counts[1].skus.len(), 1);
}
