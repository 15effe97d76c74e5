use crate::config::Config;
use crate::errors::AppError;
use crate::models::{compose_full_address, parse_owner_name, Homeowner};
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Max records requested per page.
const PAGE_SIZE: usize = 100;
/// Fixed pause between page requests; the provider rate-limits aggressively.
const PAGE_DELAY: Duration = Duration::from_millis(500);

/// Search criteria handed to the provider. `resume_offset` lets an
/// interrupted run skip pages it already consumed.
#[derive(Debug, Clone)]
pub struct SearchCriteria {
    pub city: String,
    pub state: String,
    pub min_lot_sqft: Option<f64>,
    pub min_value: Option<f64>,
    pub max_results: usize,
    pub resume_offset: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: String,
    property_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    lot_size: Option<RangeFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    estimated_value: Option<RangeFilter>,
    skip: usize,
    take: usize,
    skip_trace: bool,
}

#[derive(Debug, Serialize)]
struct RangeFilter {
    min: f64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    status: Option<ResponseStatus>,
    #[serde(default)]
    results: Option<SearchResults>,
}

#[derive(Debug, Deserialize)]
struct ResponseStatus {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    meta: Option<ResultsMeta>,
    #[serde(default)]
    properties: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultsMeta {
    #[serde(default)]
    total: Option<i64>,
    #[serde(default)]
    result_count: Option<i64>,
}

/// Paginated, rate-limited client for the property search provider.
///
/// Page failures are soft: logged, pagination stops, and whatever was
/// fetched so far is returned. Discovery is best-effort; the checkpoint and
/// a later run pick up the slack.
pub struct PropertySearchClient {
    client: Client,
    base_url: String,
    api_key: String,
    requests_made: AtomicU64,
    estimated_credits: AtomicU64,
}

impl PropertySearchClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.property_api_base_url.clone(),
            api_key: config.property_api_key.clone(),
            requests_made: AtomicU64::new(0),
            estimated_credits: AtomicU64::new(0),
        }
    }

    /// Number of page requests issued so far (cost reporting only).
    pub fn requests_made(&self) -> u64 {
        self.requests_made.load(Ordering::Relaxed)
    }

    /// Estimated provider credits consumed, one per returned record.
    pub fn estimated_credits(&self) -> u64 {
        self.estimated_credits.load(Ordering::Relaxed)
    }

    /// Fetch up to `criteria.max_results` properties, page by page, with a
    /// fixed inter-request delay. Partial results on page failure, empty on
    /// total provider outage; never an error.
    pub async fn search(&self, criteria: &SearchCriteria) -> Vec<Homeowner> {
        let mut collected: Vec<Homeowner> = Vec::new();
        let mut skip = criteria.resume_offset;

        tracing::info!(
            "Searching properties in {}, {} (cap {}, offset {})",
            criteria.city,
            criteria.state,
            criteria.max_results,
            criteria.resume_offset
        );

        loop {
            let remaining = criteria.max_results.saturating_sub(collected.len());
            if remaining == 0 {
                break;
            }
            let take = remaining.min(PAGE_SIZE);

            let page = match self.fetch_page(criteria, skip, take).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(
                        "Property search page at offset {} failed, returning {} partial results: {}",
                        skip,
                        collected.len(),
                        e
                    );
                    break;
                }
            };

            if page.is_empty() {
                tracing::debug!("Empty page at offset {}, search complete", skip);
                break;
            }

            let page_len = page.len();
            skip += page_len;
            self.estimated_credits
                .fetch_add(page_len as u64, Ordering::Relaxed);

            for raw in &page {
                if let Some(homeowner) = normalize_property(raw) {
                    collected.push(homeowner);
                }
            }

            // A short page means the provider ran out of matches.
            if page_len < take || collected.len() >= criteria.max_results {
                break;
            }

            tokio::time::sleep(PAGE_DELAY).await;
        }

        collected.truncate(criteria.max_results);
        tracing::info!(
            "Property search returned {} records ({} requests, ~{} credits)",
            collected.len(),
            self.requests_made(),
            self.estimated_credits()
        );
        collected
    }

    async fn fetch_page(
        &self,
        criteria: &SearchCriteria,
        skip: usize,
        take: usize,
    ) -> Result<Vec<Value>, AppError> {
        let url = format!("{}/v2/PropertySearch", self.base_url);
        let body = SearchRequest {
            query: format!("{}, {}", criteria.city, criteria.state),
            property_type: "SFR",
            lot_size: criteria.min_lot_sqft.map(|min| RangeFilter { min }),
            estimated_value: criteria.min_value.map(|min| RangeFilter { min }),
            skip,
            take,
            skip_trace: false,
        };

        tracing::debug!("Requesting property page: skip={} take={}", skip, take);
        self.requests_made.fetch_add(1, Ordering::Relaxed);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                AppError::ExternalApi(format!("property search request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApi(format!(
                "property search returned status {}: {}",
                status, error_text
            )));
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| {
            AppError::ExternalApi(format!(
                "failed to parse property search response: {e}"
            ))
        })?;

        if let Some(status) = &parsed.status {
            if let Some(code) = status.code {
                if code >= 400 {
                    return Err(AppError::ExternalApi(format!(
                        "provider status {}: {}",
                        code,
                        status.text.as_deref().unwrap_or("no detail")
                    )));
                }
            }
        }

        let properties = parsed
            .results
            .and_then(|r| {
                if let Some(meta) = &r.meta {
                    tracing::debug!(
                        "Page meta: total={:?} result_count={:?}",
                        meta.total,
                        meta.result_count
                    );
                }
                r.properties
            })
            .unwrap_or_default();

        Ok(properties)
    }
}

/// Normalize one provider property payload into a [`Homeowner`].
///
/// Provider versions disagree on nesting and field names, so every lookup
/// tolerates absence and known aliases. Returns `None` only when the record
/// has no street address at all; there is nothing downstream can do with
/// an unaddressable property.
pub fn normalize_property(raw: &Value) -> Option<Homeowner> {
    let address_obj = raw
        .get("address")
        .or_else(|| raw.get("propertyAddress"))
        .cloned()
        .unwrap_or_else(|| json!({}));

    let street = str_field(&address_obj, &["street", "address", "line1"]).unwrap_or_default();
    if street.trim().is_empty() {
        tracing::debug!("Skipping property with no street address");
        return None;
    }
    let city = str_field(&address_obj, &["city"]).unwrap_or_default();
    let state = str_field(&address_obj, &["state"]).unwrap_or_default();
    let zip = str_field(&address_obj, &["zip", "zipCode", "postalCode"]).unwrap_or_default();

    let owner_obj = raw
        .get("owner")
        .or_else(|| raw.get("ownerInfo"))
        .cloned()
        .unwrap_or_else(|| json!({}));
    let owner_name = str_field(&owner_obj, &["name", "fullName", "owner1FullName"])
        .unwrap_or_default();
    let (first_name, last_name, is_business) = parse_owner_name(&owner_name);

    let lot_obj = raw.get("lot").cloned().unwrap_or_else(|| json!({}));
    let building_obj = raw.get("building").cloned().unwrap_or_else(|| json!({}));
    let valuation_obj = raw
        .get("valuation")
        .or_else(|| raw.get("avm"))
        .cloned()
        .unwrap_or_else(|| json!({}));
    let sale_obj = raw
        .get("sale")
        .or_else(|| raw.get("lastSale"))
        .cloned()
        .unwrap_or_else(|| json!({}));

    let lot_sqft = num_field(&lot_obj, &["lotSquareFeet", "lotSizeSqft", "squareFeet"])
        .or_else(|| num_field(raw, &["lotSquareFeet"]));
    let lot_acres = num_field(&lot_obj, &["lotAcres", "acres"])
        .or_else(|| lot_sqft.map(|sqft| sqft / 43_560.0));

    let last_sale_date = str_field(&sale_obj, &["saleDate", "lastSaleDate"])
        .and_then(|raw_date| parse_provider_date(&raw_date));

    let full_address = compose_full_address(&street, &city, &state, &zip);

    Some(Homeowner {
        property_id: str_field(raw, &["id", "propertyId"])
            .or_else(|| num_field(raw, &["id", "propertyId"]).map(|n| n.to_string()))
            .unwrap_or_default(),
        address: street,
        city,
        state,
        zip,
        full_address,
        owner_name,
        first_name,
        last_name,
        is_business,
        lot_sqft,
        lot_acres,
        building_sqft: num_field(&building_obj, &["totalBuildingAreaSquareFeet", "squareFeet"]),
        bedrooms: num_field(&building_obj, &["bedrooms", "bedroomCount"]).map(|n| n as u32),
        bathrooms: num_field(&building_obj, &["bathrooms", "bathroomCount"]),
        year_built: num_field(&building_obj, &["yearBuilt"])
            .or_else(|| num_field(raw, &["yearBuilt"]))
            .map(|n| n as i32),
        stories: num_field(&building_obj, &["stories", "storyCount"]).map(|n| n as u32),
        corner_lot: lot_obj
            .get("cornerLot")
            .or_else(|| raw.get("cornerLot"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        estimated_value: num_field(&valuation_obj, &["estimatedValue", "value"])
            .or_else(|| num_field(raw, &["estimatedValue"])),
        estimated_equity: num_field(&valuation_obj, &["estimatedEquity", "equity"])
            .or_else(|| num_field(raw, &["estimatedEquity"])),
        last_sale_date,
        last_sale_price: num_field(&sale_obj, &["saleAmount", "lastSalePrice", "price"]),
        ..Default::default()
    })
}

/// First matching string field among aliases; numbers are not coerced.
fn str_field(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        obj.get(k)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// First matching numeric field among aliases; accepts numbers or numeric
/// strings (older provider versions quote everything).
fn num_field(obj: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| {
        obj.get(k).and_then(|v| {
            v.as_f64()
                .or_else(|| v.as_str().and_then(|s| s.trim().replace(',', "").parse().ok()))
        })
    })
}

/// Provider dates arrive as ISO "2023-06-15", sometimes with a time suffix.
fn parse_provider_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.split('T').next().unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%m/%d/%Y"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_nested_provider_shape() {
        let raw = json!({
            "id": "prop-123",
            "address": {"street": "100 E Corner Blvd", "city": "Scottsdale", "state": "AZ", "zip": "85251"},
            "owner": {"name": "Jane Doe"},
            "lot": {"lotSquareFeet": 45000.0, "cornerLot": true},
            "building": {"yearBuilt": 1995, "bedrooms": 4, "bathrooms": 2.5},
            "valuation": {"estimatedValue": 3200000.0, "estimatedEquity": 1500000.0},
            "sale": {"saleDate": "2024-01-15", "saleAmount": 2900000.0}
        });

        let h = normalize_property(&raw).expect("should normalize");
        assert_eq!(h.property_id, "prop-123");
        assert_eq!(h.full_address, "100 E Corner Blvd, Scottsdale, AZ 85251");
        assert_eq!(h.first_name.as_deref(), Some("Jane"));
        assert_eq!(h.last_name.as_deref(), Some("Doe"));
        assert_eq!(h.lot_sqft, Some(45000.0));
        assert!(h.corner_lot);
        assert_eq!(h.year_built, Some(1995));
        assert_eq!(h.estimated_value, Some(3_200_000.0));
        assert_eq!(
            h.last_sale_date,
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
    }

    #[test]
    fn tolerates_legacy_field_names_and_missing_subobjects() {
        let raw = json!({
            "propertyId": 9981,
            "propertyAddress": {"address": "55 Mesa Rd", "city": "Tempe", "state": "AZ", "zipCode": "85281"},
            "ownerInfo": {"fullName": "Sun Valley Trust"},
            "lotSquareFeet": "21,780",
            "yearBuilt": 1988
        });

        let h = normalize_property(&raw).expect("should normalize legacy shape");
        assert_eq!(h.property_id, "9981");
        assert_eq!(h.address, "55 Mesa Rd");
        assert_eq!(h.zip, "85281");
        assert!(h.is_business);
        assert_eq!(h.lot_sqft, Some(21_780.0));
        assert_eq!(h.year_built, Some(1988));
        // Missing subobjects default, never error.
        assert_eq!(h.estimated_value, None);
        assert_eq!(h.last_sale_date, None);
    }

    #[test]
    fn record_without_street_is_skipped() {
        let raw = json!({"owner": {"name": "Nobody"}});
        assert!(normalize_property(&raw).is_none());
    }

    #[test]
    fn acres_derived_from_sqft_when_absent() {
        let raw = json!({
            "address": {"street": "1 Acre Way", "city": "Mesa", "state": "AZ", "zip": "85201"},
            "lot": {"lotSquareFeet": 43560.0}
        });
        let h = normalize_property(&raw).unwrap();
        assert!((h.lot_acres.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn provider_date_formats() {
        assert_eq!(
            parse_provider_date("2023-06-15"),
            NaiveDate::from_ymd_opt(2023, 6, 15)
        );
        assert_eq!(
            parse_provider_date("2023-06-15T00:00:00Z"),
            NaiveDate::from_ymd_opt(2023, 6, 15)
        );
        assert_eq!(
            parse_provider_date("06/15/2023"),
            NaiveDate::from_ymd_opt(2023, 6, 15)
        );
        assert_eq!(parse_provider_date("not a date"), None);
    }
}
