// Core data structures for rentwatch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Listing identifier, unique per source (not per partition)
pub type OfferId = i64;

/// Lifecycle state as reported by the feed
///
/// The feed occasionally reports withdrawn listings inside a "published"
/// result set, so this value is treated as a hint only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingState {
    Published,
    Paused,
    #[serde(other)]
    Unknown,
}

impl ListingState {
    /// Parse a feed state tag, case-insensitively
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "PUBLISHED" => Self::Published,
            "PAUSED" => Self::Paused,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Published => "PUBLISHED",
            Self::Paused => "PAUSED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Persisted offer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferState {
    Published,
    Paused,
}

impl OfferState {
    /// Get string representation (as stored)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Published => "PUBLISHED",
            Self::Paused => "PAUSED",
        }
    }
}

impl fmt::Display for OfferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfferState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PUBLISHED" => Ok(Self::Published),
            "PAUSED" => Ok(Self::Paused),
            other => Err(format!("unknown offer state '{other}'")),
        }
    }
}

impl From<ListingState> for OfferState {
    fn from(state: ListingState) -> Self {
        match state {
            ListingState::Published => Self::Published,
            ListingState::Paused | ListingState::Unknown => Self::Paused,
        }
    }
}

/// Seller / agent contact block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Seller {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub phone_alt: Option<String>,
    pub when_to_call: Option<String>,
    pub seller_type: Option<String>,
}

impl Seller {
    /// Whether there is anything worth showing in a contact block
    pub fn has_contact(&self) -> bool {
        self.name.is_some() || self.phone.is_some()
    }
}

/// Descriptive listing fields
///
/// None of these take part in change detection; only the price does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingDetails {
    pub title: String,
    pub property_type: Option<String>,
    pub category: Option<String>,
    pub num_bedrooms: Option<u32>,
    pub num_bathrooms: Option<u32>,
    pub floor_area: Option<String>,
    pub ber_rating: Option<String>,
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub seller: Seller,
    pub publish_date: Option<DateTime<Utc>>,
}

impl ListingDetails {
    /// Latitude/longitude pair when both are known
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// A listing as reported by the feed in one sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: OfferId,
    pub partition: String,
    pub state: ListingState,
    /// Monthly price in whole currency units
    pub price: i64,
    /// The feed showed no price (`Price on Application`); `price` is not meaningful
    #[serde(default)]
    pub price_withheld: bool,
    pub url: String,
    pub details: ListingDetails,
}

impl Listing {
    /// Create a published listing with empty details
    pub fn new(id: OfferId, partition: impl Into<String>, price: i64) -> Self {
        Self {
            id,
            partition: partition.into(),
            state: ListingState::Published,
            price,
            price_withheld: false,
            url: String::new(),
            details: ListingDetails::default(),
        }
    }

    /// A listing whose price the feed did not disclose
    pub fn withheld(id: OfferId, partition: impl Into<String>) -> Self {
        Self {
            price_withheld: true,
            ..Self::new(id, partition, 0)
        }
    }

    pub fn with_state(mut self, state: ListingState) -> Self {
        self.state = state;
        self
    }

    pub fn with_details(mut self, details: ListingDetails) -> Self {
        self.details = details;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn is_published(&self) -> bool {
        self.state == ListingState::Published
    }
}

/// Persisted offer record, one per listing id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub partition: String,
    pub state: OfferState,
    pub price: i64,
    pub url: String,
    pub details: ListingDetails,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Offer {
    /// Build the full replacement record for a listing seen at `seen_at`
    pub fn from_listing(listing: &Listing, seen_at: DateTime<Utc>) -> Self {
        Self {
            id: listing.id,
            partition: listing.partition.clone(),
            state: listing.state.into(),
            price: listing.price,
            url: listing.url.clone(),
            details: listing.details.clone(),
            first_seen_at: seen_at,
            updated_at: seen_at,
        }
    }

    pub fn is_published(&self) -> bool {
        self.state == OfferState::Published
    }
}

/// Notification routing key of a partition (e.g. a chat thread id)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingKey(String);

impl RoutingKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An independently polled subdivision of the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    /// Partition key, also stored on every offer
    pub key: String,
    /// Location identifier understood by the feed
    pub location_id: String,
    pub active: bool,
    pub routing_key: RoutingKey,
}

impl Partition {
    /// Create an active partition
    pub fn new(
        key: impl Into<String>,
        location_id: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            location_id: location_id.into(),
            active: true,
            routing_key: RoutingKey::new(routing_key),
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
