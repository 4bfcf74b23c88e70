//! Catalog product snapshots and the purchasability rules derived from them.

use serde::{Deserialize, Deserializer, Serialize};

/// Point-in-time catalog record for one SKU within a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub compare_price: Option<f64>,
    #[serde(default)]
    pub available: i64,
    #[serde(default)]
    pub inventory_quantity: i64,
    #[serde(default)]
    pub inventory_low_stock_quantity: i64,
    #[serde(
        default,
        rename = "inventory_allow_out_of_stock",
        deserialize_with = "deserialize_flag"
    )]
    pub allow_out_of_stock: bool,
    #[serde(default)]
    pub net_quantity: Option<String>,
    #[serde(default)]
    pub metafields: Option<Metafields>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metafields {
    #[serde(default)]
    pub uom: Option<String>,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub benefits: Option<String>,
}

impl ProductSnapshot {
    /// A product is purchasable when out-of-stock orders are allowed, or when it
    /// is available and its inventory has not dropped below the low-stock mark.
    #[must_use]
    pub const fn is_purchasable(&self) -> bool {
        if self.allow_out_of_stock {
            return true;
        }
        self.available > 0 && self.inventory_quantity >= self.inventory_low_stock_quantity
    }

    /// Quantity shown to users. Stock under the low-stock mark counts as zero.
    #[must_use]
    pub const fn display_quantity(&self) -> i64 {
        if !self.allow_out_of_stock
            && self.inventory_low_stock_quantity > self.inventory_quantity
        {
            return 0;
        }
        if self.inventory_quantity < 0 {
            return 0;
        }
        self.inventory_quantity - self.inventory_low_stock_quantity
    }

    /// True when the stock fields used for change detection differ.
    #[must_use]
    pub const fn stock_differs(&self, other: &Self) -> bool {
        self.available != other.available || self.inventory_quantity != other.inventory_quantity
    }

    /// Extracts the protein line (e.g. "20g protein") from the benefits list.
    #[must_use]
    pub fn protein(&self) -> Option<String> {
        let benefits = self.metafields.as_ref()?.benefits.as_deref()?;
        benefits
            .split("<li>")
            .skip(1)
            .filter_map(|item| item.split("</li>").next())
            .map(strip_tags)
            .find(|item| {
                item.to_ascii_lowercase().contains("protein")
                    && item.chars().any(|c| c.is_ascii_digit())
            })
            .map(|item| item.trim().to_string())
    }
}

fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Upstream encodes the allow-out-of-stock flag as `"0"`/`"1"`; anything other
/// than zero, false or empty means allowed.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::Bool(flag)) => flag,
        Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(serde_json::Value::String(s)) => !matches!(s.trim(), "" | "0" | "false"),
        Some(_) => true,
    })
}
