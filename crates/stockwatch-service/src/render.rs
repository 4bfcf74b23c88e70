//! Message text for notifications, operator summaries and reports.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use stockwatch_core::product::ProductSnapshot;
use stockwatch_core::types::{Region, TrackingPolicy};

use crate::delivery::OutboundMessage;
use crate::store::RegionSkuCounts;

const INDENT: &str = "     ";

#[derive(Debug, Clone)]
pub struct Renderer {
    shop_base_url: String,
    bot_username: Option<String>,
    timezone: Tz,
}

/// Escapes text for Telegram's HTML parse mode.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

impl Renderer {
    #[must_use]
    pub fn new(shop_base_url: &str, bot_username: Option<String>, timezone: Tz) -> Self {
        Self {
            shop_base_url: shop_base_url.trim_end_matches('/').to_string(),
            bot_username,
            timezone,
        }
    }

    #[must_use]
    pub fn product_url(&self, product: &ProductSnapshot) -> String {
        format!("{}/en/product/{}", self.shop_base_url, product.alias)
    }

    /// Bot deep link carrying a `/start` payload, when the bot name is known.
    #[must_use]
    pub fn start_link(&self, payload: &str) -> Option<String> {
        self.bot_username
            .as_deref()
            .map(|bot| format!("https://t.me/{bot}?start={payload}"))
    }

    /// Numbered product block used in notifications and listings.
    #[must_use]
    pub fn product_details(
        &self,
        product: &ProductSnapshot,
        index: usize,
        last_in_stock: Option<DateTime<Utc>>,
        remaining_notify_count: Option<i32>,
    ) -> String {
        let protein = product.protein().unwrap_or_else(|| "N/A".to_string());
        let in_stock = if product.is_purchasable() {
            "Yes 🟢"
        } else {
            "No 🔴"
        };

        let mut lines = vec![
            format!(
                "{}. <b><a href=\"{}\">{}</a></b>",
                index + 1,
                self.product_url(product),
                escape_html(&product.name)
            ),
            format!("{INDENT}Protein: <b>{}</b>", escape_html(&protein)),
            format!("{INDENT}Price: <b>{}</b>", product.price),
            format!("{INDENT}In Stock: <b>{in_stock}</b>"),
        ];
        if let Some(seen) = last_in_stock {
            let local = seen.with_timezone(&self.timezone);
            lines.push(format!(
                "{INDENT}Last InStock: <b>{}</b>",
                local.format("%d-%m-%Y, %I:%M %p")
            ));
        }
        if let Some(remaining) = remaining_notify_count {
            lines.push(format!("{INDENT}Remaining Notifications: <b>{remaining}</b>"));
        }
        lines.push(format!(
            "{INDENT}Available Quantity: <b>{}</b>",
            product.display_quantity()
        ));
        lines.join("\n")
    }

    /// ## Summary
    /// Restock notification for one tracking record. `remaining` is the
    /// record's budget before this notification is spent.
    #[must_use]
    pub fn notification(
        &self,
        product: &ProductSnapshot,
        policy: TrackingPolicy,
        remaining: i32,
    ) -> OutboundMessage {
        let text = format!(
            "🔥 <b>Product Update: {}</b>\n{}\n\n<i>{}</i>",
            escape_html(&product.name),
            self.product_details(product, 0, None, None),
            budget_hint(policy, remaining)
        );

        let (label, action) = match policy {
            TrackingPolicy::Once => ("Track Again", "track"),
            TrackingPolicy::Always { .. } => ("Untrack", "untrack"),
        };
        let message = OutboundMessage::html(text);
        match self.start_link(&format!("{action}_{}", product.sku)) {
            Some(url) => message.with_button(label, url),
            None => message,
        }
    }
}

/// What happens to the user's tracking after this notification.
#[must_use]
pub fn budget_hint(policy: TrackingPolicy, remaining: i32) -> String {
    match policy {
        TrackingPolicy::Once => {
            "The product is now untracked. You can track it again using the button below."
                .to_string()
        }
        TrackingPolicy::Always { .. } if remaining - 1 < 1 => {
            "You will receive more updates when the product will be restocked.".to_string()
        }
        TrackingPolicy::Always { max_count } => format!(
            "You will receive updates {} more times for this product. Once done, You'll receive {max_count} update(s) on next restock.",
            remaining - 1
        ),
    }
}

/// Operator summary for one region's sweep. `notified` counts the
/// notifications attempted, delivered or not.
#[must_use]
pub fn stock_summary(region: &Region, changed: &[ProductSnapshot], notified: usize) -> String {
    let products = changed
        .iter()
        .map(|p| format!("{} ({})", escape_html(&p.name), p.display_quantity()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "🔄 Stock update ({}): {products}\nNotified {notified} users.",
        escape_html(&region.to_string())
    )
}

/// One region's block of the tracked-sku report. `names` maps skus to
/// display names; unknown skus are shown as-is. `None` means the region has
/// no live session to resolve names with.
#[must_use]
pub fn tracked_region_section(
    counts: &RegionSkuCounts,
    names: Option<&HashMap<String, String>>,
) -> String {
    let header = format!(
        "📍 <b>{}</b> ({})\n",
        escape_html(counts.region.as_str()),
        counts.total
    );
    let Some(names) = names else {
        return format!("{header}No active session found for this region.");
    };
    let lines = counts
        .skus
        .iter()
        .map(|entry| {
            let name = names.get(&entry.sku).unwrap_or(&entry.sku);
            format!("- <b>{}</b> ({})", escape_html(name), entry.count)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("{header}{lines}")
}

/// Packs sections into as few messages as possible, each at most `limit`
/// characters. Sections are separated by a blank line and never split, so a
/// single oversized section gets a message of its own.
#[must_use]
pub fn pack_sections(sections: &[String], limit: usize) -> Vec<String> {
    let mut messages = Vec::new();
    let mut current = String::new();
    for section in sections {
        if !current.is_empty() {
            if current.chars().count() + 2 + section.chars().count() > limit {
                messages.push(std::mem::take(&mut current));
            } else {
                current.push_str("\n\n");
            }
        }
        current.push_str(section);
    }
    if !current.is_empty() {
        messages.push(current);
    }
    messages
}

#[must_use]
pub fn statistics_report(total_users: i64, active_today: i64) -> String {
    [
        "<b>Bot Statistics</b>".to_string(),
        format!("Total Users: <b>{total_users}</b>"),
        format!("Total Active Users (Today): <b>{active_today}</b>"),
        format!(
            "Total Inactive Users: <b>{}</b>",
            total_users - active_today
        ),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> ProductSnapshot {
        serde_json::from_value(serde_json::json!({
            "sku": "A1",
            "name": "Whey & Milk",
            "alias": "whey-milk",
            "price": 90.0,
            "available": 1,
            "inventory_quantity": 12,
            "inventory_low_stock_quantity": 2,
        }))
        .unwrap()
    }

    fn renderer(bot: Option<&str>) -> Renderer {
        Renderer::new(
            "https://shop.example.com/",
            bot.map(str::to_string),
            chrono_tz::Asia::Kolkata,
        )
    }

    #[test]
    fn once_notification_offers_track_again() {
        let message = renderer(Some("stockbot")).notification(&product(), TrackingPolicy::Once, 1);
        assert!(message.text.contains("Product Update: Whey &amp; Milk"));
        assert!(message.text.contains("Available Quantity: <b>10</b>"));
        assert!(message.text.contains("now untracked"));
        assert_eq!(message.keyboard[0][0].text, "Track Again");
        assert_eq!(
            message.keyboard[0][0].url,
            "https://t.me/stockbot?start=track_A1"
        );
    }

    #[test]
    fn always_notification_offers_untrack() {
        let message = renderer(Some("stockbot")).notification(
            &product(),
            TrackingPolicy::Always { max_count: 3 },
            3,
        );
        assert_eq!(message.keyboard[0][0].text, "Untrack");
        assert!(message.keyboard[0][0].url.ends_with("start=untrack_A1"));
        assert!(message.text.contains("2 more times"));
        assert!(message.text.contains("You'll receive 3 update(s)"));
    }

    #[test]
    fn last_budget_unit_mentions_next_restock() {
        assert_eq!(
            budget_hint(TrackingPolicy::Always { max_count: 5 }, 1),
            "You will receive more updates when the product will be restocked."
        );
    }

    #[test]
    fn no_keyboard_without_bot_username() {
        let message = renderer(None).notification(&product(), TrackingPolicy::Once, 1);
        assert!(message.keyboard.is_empty());
    }

    #[test]
    fn summary_lists_changed_products() {
        let text = stock_summary(&Region::from("delhi"), &[product()], 4);
        assert_eq!(text, "🔄 Stock update (delhi): Whey &amp; Milk (10)\nNotified 4 users.");
    }

    #[test]
    fn statistics_include_inactive_count() {
        let text = statistics_report(10, 4);
        assert!(text.contains("Total Users: <b>10</b>"));
        assert!(text.contains("Total Inactive Users: <b>6</b>"));
    }

    fn delhi_counts() -> RegionSkuCounts {
        RegionSkuCounts {
            region: Region::from("delhi"),
            total: 3,
            skus: vec![
                crate::store::SkuCount {
                    sku: "P1".to_string(),
                    count: 2,
                },
                crate::store::SkuCount {
                    sku: "P2".to_string(),
                    count: 1,
                },
            ],
        }
    }

    #[test]
    fn region_section_names_known_skus() {
        let names = HashMap::from([("P1".to_string(), "Whey & Milk".to_string())]);
        let text = tracked_region_section(&delhi_counts(), Some(&names));
        assert_eq!(
            text,
            "📍 <b>delhi</b> (3)\n- <b>Whey &amp; Milk</b> (2)\n- <b>P2</b> (1)"
        );
    }

    #[test]
    fn region_section_without_session() {
        let text = tracked_region_section(&delhi_counts(), None);
        assert_eq!(
            text,
            "📍 <b>delhi</b> (3)\nNo active session found for this region."
        );
    }

    #[test]
    fn sections_are_packed_under_the_limit() {
        let sections = vec!["a".repeat(6), "b".repeat(6), "c".repeat(20), "d".repeat(2)];
        let messages = pack_sections(&sections, 14);
        assert_eq!(
            messages,
            vec![
                format!("{}\n\n{}", "a".repeat(6), "b".repeat(6)),
                "c".repeat(20),
                "d".repeat(2),
            ]
        );
        assert!(pack_sections(&[], 14).is_empty());
    }
}
