//! HTTP implementation of the catalog connector.
//!
//! A session is created in four steps: collect cookies from the browse page,
//! read the session `tid` from `/user/info.js`, resolve the pincode to a
//! substore, and store that substore as the session's preference. The
//! cookie jar lives inside the `reqwest::Client`.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Response, Url};

use stockwatch_core::config::UpstreamConfig;
use stockwatch_core::product::ProductSnapshot;
use stockwatch_core::types::Region;

use super::token::fresh_tid;
use super::types::{PincodeRecord, PincodeResponse, ProductsResponse, parse_session_script};
use super::{CatalogConnector, CatalogSession};
use crate::error::UpstreamError;

const TID_HEADER: &str = "tid";
const BROWSE_PATH: &str = "/en/browse/protein";

const PRODUCT_FIELDS: &[&str] = &[
    "fields[name]",
    "fields[brand]",
    "fields[categories]",
    "fields[collections]",
    "fields[alias]",
    "fields[sku]",
    "fields[price]",
    "fields[compare_price]",
    "fields[original_price]",
    "fields[images]",
    "fields[metafields]",
    "fields[discounts]",
    "fields[catalog_only]",
    "fields[is_catalog]",
    "fields[seller]",
    "fields[available]",
    "fields[inventory_quantity]",
    "fields[net_quantity]",
    "fields[num_reviews]",
    "fields[avg_rating]",
    "fields[inventory_low_stock_quantity]",
    "fields[inventory_allow_out_of_stock]",
    "fields[default_variant]",
    "fields[variants]",
    "fields[lp_seller_ids]",
];

#[derive(Debug, Clone)]
pub struct HttpConnector {
    config: Arc<UpstreamConfig>,
}

impl HttpConnector {
    #[must_use]
    pub fn new(config: UpstreamConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn default_headers(&self) -> Result<HeaderMap, UpstreamError> {
        let base = self.base_url();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert("frontend", HeaderValue::from_static("1"));
        headers.insert(header::REFERER, header_value(&format!("{base}/"))?);
        headers.insert("base_url", header_value(&format!("{base}{BROWSE_PATH}"))?);
        Ok(headers)
    }

    fn build_client(&self) -> Result<Client, UpstreamError> {
        Ok(Client::builder()
            .cookie_store(true)
            .default_headers(self.default_headers()?)
            .user_agent(self.config.user_agent.as_str())
            .timeout(self.config.request_timeout())
            .build()?)
    }

    async fn open_session(&self, client: &Client) -> Result<String, UpstreamError> {
        let base = self.base_url();
        let browse_url = format!("{base}{BROWSE_PATH}");
        let response = ensure_success(client.get(&browse_url).send().await?)?;
        if !response.headers().contains_key(header::SET_COOKIE) {
            return Err(UpstreamError::MissingCookies);
        }

        let info_url = format!(
            "{base}/user/info.js?_v={}",
            chrono::Utc::now().timestamp_millis()
        );
        let body = ensure_success(
            client
                .get(&info_url)
                .header(TID_HEADER, fresh_tid(&self.config.store_id, ""))
                .send()
                .await?,
        )?
        .text()
        .await?;

        let info = parse_session_script(&body).map_err(|e| UpstreamError::Decode(e.to_string()))?;
        Ok(info.tid.unwrap_or_default())
    }

    async fn search_pincode(
        &self,
        client: &Client,
        session_tid: &str,
        pincode: &str,
    ) -> Result<Vec<PincodeRecord>, UpstreamError> {
        let url = parse_url(
            &format!("{}/entity/pincode", self.base_url()),
            &[
                ("limit", "50"),
                ("filters[0][field]", "pincode"),
                ("filters[0][value]", pincode),
                ("filters[0][operator]", "regex"),
                ("cf_cache", "1h"),
            ],
        )?;

        let response: PincodeResponse = ensure_success(
            client
                .get(url)
                .header(TID_HEADER, fresh_tid(&self.config.store_id, session_tid))
                .send()
                .await?,
        )?
        .json()
        .await?;
        Ok(response.records)
    }

    async fn set_preferences(
        &self,
        client: &Client,
        session_tid: &str,
        record: &PincodeRecord,
    ) -> Result<(), UpstreamError> {
        let url = format!("{}/entity/ms.settings/_/setPreferences", self.base_url());
        let body = serde_json::json!({ "data": { "store": record.substore } });
        ensure_success(
            client
                .put(&url)
                .header(TID_HEADER, fresh_tid(&self.config.store_id, session_tid))
                .json(&body)
                .send()
                .await?,
        )?;
        Ok(())
    }
}

#[async_trait]
impl CatalogConnector for HttpConnector {
    #[tracing::instrument(skip(self))]
    async fn connect(&self, pincode: &str) -> Result<Arc<dyn CatalogSession>, UpstreamError> {
        let client = self.build_client()?;
        let session_tid = self.open_session(&client).await?;
        tracing::debug!("Upstream session token acquired");

        let record = self
            .search_pincode(&client, &session_tid, pincode)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::UnknownPincode(pincode.to_string()))?;

        self.set_preferences(&client, &session_tid, &record).await?;
        tracing::info!(
            pincode = %record.pincode,
            substore = %record.substore,
            "Upstream store preference set"
        );

        Ok(Arc::new(HttpSession {
            client,
            config: Arc::clone(&self.config),
            session_tid,
            region: Region::from(record.substore.as_str()),
            pincode: record.pincode,
        }))
    }
}

struct HttpSession {
    client: Client,
    config: Arc<UpstreamConfig>,
    session_tid: String,
    region: Region,
    pincode: String,
}

impl HttpSession {
    /// Substore id sent to the products endpoint. Unmapped aliases are sent as-is.
    fn substore_id(&self) -> &str {
        self.config
            .substore_ids
            .get(self.region.as_str())
            .map_or(self.region.as_str(), String::as_str)
    }
}

#[async_trait]
impl CatalogSession for HttpSession {
    fn region(&self) -> &Region {
        &self.region
    }

    fn pincode(&self) -> &str {
        &self.pincode
    }

    #[tracing::instrument(skip(self), fields(region = %self.region))]
    async fn fetch_products(&self) -> Result<Vec<ProductSnapshot>, UpstreamError> {
        let base = self.config.base_url.trim_end_matches('/');
        let mut params: Vec<(&str, &str)> = PRODUCT_FIELDS.iter().map(|f| (*f, "1")).collect();
        params.extend([
            ("filters[0][field]", "categories"),
            ("filters[0][value][0]", "protein"),
            ("filters[0][operator]", "in"),
            ("filters[0][original]", "1"),
            ("facets", "true"),
            ("facetgroup", "default_category_facet"),
            ("limit", "32"),
            ("total", "1"),
            ("start", "0"),
            ("substore", self.substore_id()),
        ]);
        let url = parse_url(&format!("{base}/api/1/entity/ms.products"), &params)?;

        let response: ProductsResponse = ensure_success(
            self.client
                .get(url)
                .header(TID_HEADER, fresh_tid(&self.config.store_id, &self.session_tid))
                .send()
                .await?,
        )?
        .json()
        .await?;

        tracing::debug!(count = response.data.len(), "Fetched upstream catalog");
        Ok(response.data)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, UpstreamError> {
    HeaderValue::from_str(value).map_err(|e| UpstreamError::InvalidHeader(e.to_string()))
}

fn parse_url(base: &str, params: &[(&str, &str)]) -> Result<Url, UpstreamError> {
    Url::parse_with_params(base, params).map_err(|e| UpstreamError::InvalidUrl(e.to_string()))
}

fn ensure_success(response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(UpstreamError::Status {
            url: response.url().to_string(),
            status: status.as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_follow_configured_base_url() {
        let connector = HttpConnector::new(UpstreamConfig {
            base_url: "https://shop.example.com/".to_string(),
            ..UpstreamConfig::default()
        });
        let headers = connector.default_headers().unwrap();
        assert_eq!(headers["referer"], "https://shop.example.com/");
        assert_eq!(
            headers["base_url"],
            "https://shop.example.com/en/browse/protein"
        );
        assert_eq!(headers["frontend"], "1");
    }

    #[test]
    fn bracketed_params_are_encoded() {
        let url = parse_url(
            "https://shop.example.com/entity/pincode",
            &[("filters[0][value]", "110001")],
        )
        .unwrap();
        assert_eq!(url.path(), "/entity/pincode");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![("filters[0][value]".to_string(), "110001".to_string())]
        );
    }
}
