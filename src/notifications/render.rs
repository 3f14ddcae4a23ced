//! Plain-text rendering of offer notifications

use crate::models::{Listing, ListingDetails};
use crate::sweep::reconcile::PriceChange;

/// One notification to deliver
#[derive(Debug, Clone, Copy)]
pub enum Notification<'a> {
    New(&'a Listing),
    PriceChanged(&'a PriceChange),
}

impl Notification<'_> {
    pub fn listing(&self) -> &Listing {
        match self {
            Self::New(listing) => listing,
            Self::PriceChanged(change) => &change.listing,
        }
    }

    pub fn old_price(&self) -> Option<i64> {
        match self {
            Self::New(_) => None,
            Self::PriceChanged(change) => Some(change.old_price),
        }
    }
}

/// Turns notifications into message text
#[derive(Debug, Clone)]
pub struct MessageRenderer {
    currency: String,
}

impl Default for MessageRenderer {
    fn default() -> Self {
        Self::new("€")
    }
}

impl MessageRenderer {
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
        }
    }

    pub fn render(&self, notification: &Notification<'_>) -> String {
        let listing = notification.listing();
        let details = &listing.details;
        let mut lines = Vec::new();

        match notification.old_price() {
            None => lines.push(format!("🏠 New: {}/month", self.price(listing.price))),
            Some(old) => {
                let delta = listing.price - old;
                let arrow = if delta < 0 { "📉" } else { "📈" };
                lines.push(format!(
                    "{arrow} Price change: {}/month (was {}, {}{})",
                    self.price(listing.price),
                    self.price(old),
                    if delta < 0 { "-" } else { "+" },
                    self.price(delta.abs()),
                ));
            }
        }

        if let Some(facts) = facts_line(details) {
            lines.push(facts);
        }
        if !details.title.is_empty() {
            lines.push(details.title.clone());
        }
        if !listing.url.is_empty() {
            lines.push(listing.url.clone());
        }
        if let Some((lat, lon)) = details.coordinates() {
            lines.push(format!(
                "📍 https://www.google.com/maps/search/?api=1&query={lat},{lon}"
            ));
        }
        if details.seller.has_contact() {
            lines.push(String::new());
            if let Some(name) = &details.seller.name {
                lines.push(format!("👤 {name}"));
            }
            let phones: Vec<&str> = [&details.seller.phone, &details.seller.phone_alt]
                .into_iter()
                .flatten()
                .map(String::as_str)
                .collect();
            if !phones.is_empty() {
                lines.push(format!("📞 {}", phones.join(" / ")));
            }
            if let Some(when) = &details.seller.when_to_call {
                lines.push(format!("🕑 {when}"));
            }
        }

        lines.join("\n")
    }

    fn price(&self, amount: i64) -> String {
        format!("{}{}", self.currency, group_thousands(amount))
    }
}

fn facts_line(details: &ListingDetails) -> Option<String> {
    let mut facts = Vec::new();
    if let Some(beds) = details.num_bedrooms {
        facts.push(format!("{beds} bed"));
    }
    if let Some(baths) = details.num_bathrooms {
        facts.push(format!("{baths} bath"));
    }
    if let Some(kind) = &details.property_type {
        facts.push(kind.clone());
    }
    if let Some(rating) = &details.ber_rating {
        facts.push(format!("BER {rating}"));
    }
    (!facts.is_empty()).then(|| facts.join(" · "))
}

fn group_thousands(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if amount < 0 {
        out.insert(0, '-');
    }
    out
}
