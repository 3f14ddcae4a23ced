//! Listing gateway wire format
//!
//! Only the fields the watcher keeps are modelled; everything else in the
//! response is ignored.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Listing, ListingDetails, ListingState, Seller};

/// Search request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub section: &'static str,
    pub filters: Vec<SearchFilter>,
    pub and_filters: Vec<SearchFilter>,
    pub ranges: Vec<serde_json::Value>,
    pub paging: Paging,
    pub geo_filter: GeoFilter,
    pub sort: &'static str,
    pub terms: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchFilter {
    pub name: &'static str,
    pub values: Vec<&'static str>,
}

/// Offsets are sent as strings by the site itself
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paging {
    pub from: String,
    pub page_size: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoFilter {
    pub stored_shape_ids: Vec<String>,
    pub geo_search_type: &'static str,
}

impl SearchRequest {
    /// Newest-first rentals for one stored location
    pub fn rentals(location_id: &str, from: usize, page_size: usize) -> Self {
        Self {
            section: "residential-to-rent",
            filters: vec![SearchFilter {
                name: "adState",
                values: vec!["published"],
            }],
            and_filters: Vec::new(),
            ranges: Vec::new(),
            paging: Paging {
                from: from.to_string(),
                page_size: page_size.to_string(),
            },
            geo_filter: GeoFilter {
                stored_shape_ids: vec![location_id.to_string()],
                geo_search_type: "STORED_SHAPES",
            },
            sort: "publishDateDesc",
            terms: String::new(),
        }
    }
}

/// Search response body
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub listings: Vec<ListingEnvelope>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingEnvelope {
    pub listing: WireListing,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireListing {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub seo_friendly_path: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub num_bedrooms: Option<String>,
    #[serde(default)]
    pub num_bathrooms: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub publish_date: Option<i64>,
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default)]
    pub floor_area: Option<FloorArea>,
    #[serde(default)]
    pub ber: Option<Ber>,
    #[serde(default)]
    pub point: Option<Point>,
    #[serde(default)]
    pub seller: Option<WireSeller>,
    #[serde(default)]
    pub media: Option<Media>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FloorArea {
    pub unit: Option<String>,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ber {
    pub rating: Option<String>,
}

/// GeoJSON point, `[lon, lat]`
#[derive(Debug, Clone, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSeller {
    pub seller_id: Option<i64>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub alternative_phone: Option<String>,
    pub phone_when_to_call: Option<String>,
    pub seller_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Media {
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    #[serde(rename = "size720x480")]
    pub size_720x480: Option<String>,
}

impl WireListing {
    /// Convert to a [`Listing`], marking the price withheld when none is usable
    pub fn into_listing(self, partition: &str, site_url: &str) -> Listing {
        let price = self.price.as_deref().and_then(monthly_price);
        let state = self
            .state
            .as_deref()
            .map(ListingState::parse)
            .unwrap_or(ListingState::Unknown);
        let url = self
            .seo_friendly_path
            .map(|path| format!("{}{}", site_url.trim_end_matches('/'), path))
            .unwrap_or_default();

        let (longitude, latitude) = match self.point.as_ref().map(|p| p.coordinates.as_slice()) {
            Some([lon, lat, ..]) => (Some(*lon), Some(*lat)),
            _ => (None, None),
        };

        let details = ListingDetails {
            title: self.title.unwrap_or_default(),
            property_type: self.property_type,
            category: self.category,
            num_bedrooms: self.num_bedrooms.as_deref().and_then(leading_count),
            num_bathrooms: self.num_bathrooms.as_deref().and_then(leading_count),
            floor_area: self.floor_area.map(|area| area.display()),
            ber_rating: self.ber.and_then(|ber| ber.rating),
            sections: self.sections,
            images: self
                .media
                .map(|media| {
                    media
                        .images
                        .into_iter()
                        .filter_map(|image| image.size_720x480)
                        .collect()
                })
                .unwrap_or_default(),
            latitude,
            longitude,
            seller: self.seller.map(WireSeller::into_seller).unwrap_or_default(),
            publish_date: self.publish_date.and_then(epoch_millis),
        };

        let listing = match price {
            Some(price) => Listing::new(self.id, partition, price),
            None => Listing::withheld(self.id, partition),
        };
        listing
            .with_state(state)
            .with_url(url)
            .with_details(details)
    }
}

impl FloorArea {
    fn display(&self) -> String {
        let value = match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match self.unit.as_deref() {
            Some("METRES_SQUARED") => format!("{value} m²"),
            Some("FEET_SQUARED") => format!("{value} ft²"),
            Some(unit) => format!("{value} {unit}"),
            None => value,
        }
    }
}

impl WireSeller {
    fn into_seller(self) -> Seller {
        Seller {
            id: self.seller_id,
            name: non_blank(self.name),
            phone: non_blank(self.phone),
            phone_alt: non_blank(self.alternative_phone),
            when_to_call: non_blank(self.phone_when_to_call),
            seller_type: self.seller_type,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Normalise a displayed price to a monthly amount
///
/// `€1,200 per month` → 1200, `€300 per week` → 1300. Text without any
/// digits (`Price on Application`) yields `None`.
pub fn monthly_price(text: &str) -> Option<i64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(char::is_ascii_digit)
        .collect();
    let amount: i64 = digits.parse().ok()?;

    let lower = text.to_ascii_lowercase();
    let monthly = if lower.contains("week") {
        amount.checked_mul(52)?.checked_add(6)? / 12
    } else if lower.contains("year") || lower.contains("annum") {
        amount.checked_add(6)? / 12
    } else {
        amount
    };
    Some(monthly)
}

/// Leading count of strings such as `2 Bed` or `1 Bath`; studios count as 0
pub fn leading_count(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    if trimmed.to_ascii_lowercase().starts_with("studio") {
        return Some(0);
    }
    let digits: String = trimmed.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}
