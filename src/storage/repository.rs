//! Repository Pattern for offer persistence
//!
//! Trait-based repository so the sweep logic never touches SQL directly:
//! - [`SqliteOfferRepository`] for production
//! - [`MockOfferRepository`] for tests and dry runs
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │           Sweep orchestrator                 │
//! └──────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────┐
//! │              OfferRepository                 │
//! └──────────────────────────────────────────────┘
//!             │                     │
//!             ▼                     ▼
//!    ┌─────────────────┐   ┌─────────────────┐
//!    │     SQLite      │   │      Mock       │
//!    └─────────────────┘   └─────────────────┘
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::models::{ListingDetails, Offer, OfferId, OfferState, Seller};

// ============================================================================
// Core Types
// ============================================================================

/// Filter for listing persisted offers
#[derive(Debug, Clone, Default)]
pub struct OfferFilter {
    pub partition: Option<String>,
    pub state: Option<OfferState>,
    pub limit: Option<usize>,
}

impl OfferFilter {
    pub fn partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    pub fn state(mut self, state: OfferState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, offer: &Offer) -> bool {
        self.partition.as_deref().map_or(true, |p| offer.partition == p)
            && self.state.map_or(true, |s| offer.state == s)
    }
}

/// Offer counts by state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OfferStats {
    pub total: usize,
    pub published: usize,
    pub paused: usize,
}

/// What a partition persist actually changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistSummary {
    pub upserted: usize,
    pub paused: usize,
}

// ============================================================================
// Repository Trait
// ============================================================================

/// Store gateway for offers
///
/// One row per offer id across the whole store. Offers are never deleted.
pub trait OfferRepository: Send + Sync {
    /// Published offer id → price for one partition
    fn published_prices(&self, partition: &str) -> Result<HashMap<OfferId, i64>>;

    /// Whether the partition has at least one published offer
    fn has_any_published(&self, partition: &str) -> Result<bool>;

    /// Owning partition of each id that is published anywhere in the store
    fn published_owners(&self, ids: &[OfferId]) -> Result<HashMap<OfferId, String>>;

    /// Insert or fully replace offers (keeps the original `first_seen_at`)
    fn upsert_offers(&self, offers: &[Offer]) -> Result<usize>;

    /// Move published offers to PAUSED; returns how many changed state
    fn mark_paused(&self, ids: &[OfferId]) -> Result<usize>;

    /// Upsert + mark paused as one unit: either all of it lands or none
    fn apply_partition(&self, offers: &[Offer], withdrawn: &[OfferId]) -> Result<PersistSummary>;

    /// Get an offer by id
    fn get_offer(&self, id: OfferId) -> Result<Option<Offer>>;

    /// List offers, most recently updated first
    fn list_offers(&self, filter: &OfferFilter) -> Result<Vec<Offer>>;

    /// Offer counts
    fn stats(&self) -> Result<OfferStats>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

const OFFER_COLUMNS: &str = "id, partition, state, price, url, title, property_type, category, \
     num_bedrooms, num_bathrooms, floor_area, ber_rating, sections, images, latitude, longitude, \
     seller_id, seller_name, seller_phone, seller_phone_alt, seller_when_to_call, seller_type, \
     publish_date, first_seen_at, updated_at";

/// SQLite implementation of OfferRepository
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteOfferRepository {
    conn: Mutex<Connection>,
}

impl SqliteOfferRepository {
    /// Open (or create) the database at `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite offer repository initialized");
        Ok(repo)
    }

    /// Create in-memory repository (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory SQLite")?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;
        Ok(repo)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection mutex poisoned"))
    }

    fn create_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS offers (
                    id INTEGER PRIMARY KEY,
                    partition TEXT NOT NULL,
                    state TEXT NOT NULL,
                    price INTEGER NOT NULL,
                    url TEXT NOT NULL,
                    title TEXT NOT NULL,
                    property_type TEXT,
                    category TEXT,
                    num_bedrooms INTEGER,
                    num_bathrooms INTEGER,
                    floor_area TEXT,
                    ber_rating TEXT,
                    sections TEXT NOT NULL DEFAULT '[]',
                    images TEXT NOT NULL DEFAULT '[]',
                    latitude REAL,
                    longitude REAL,
                    seller_id INTEGER,
                    seller_name TEXT,
                    seller_phone TEXT,
                    seller_phone_alt TEXT,
                    seller_when_to_call TEXT,
                    seller_type TEXT,
                    publish_date TEXT,
                    first_seen_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_offers_partition_state
                    ON offers(partition, state);
                "#,
        )
        .context("Failed to create SQLite schema")?;

        Ok(())
    }
}

fn upsert_with(conn: &Connection, offers: &[Offer]) -> Result<usize> {
    let sql = format!(
        r#"
            INSERT INTO offers ({OFFER_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                    ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)
            ON CONFLICT(id) DO UPDATE SET
                partition = excluded.partition,
                state = excluded.state,
                price = excluded.price,
                url = excluded.url,
                title = excluded.title,
                property_type = excluded.property_type,
                category = excluded.category,
                num_bedrooms = excluded.num_bedrooms,
                num_bathrooms = excluded.num_bathrooms,
                floor_area = excluded.floor_area,
                ber_rating = excluded.ber_rating,
                sections = excluded.sections,
                images = excluded.images,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                seller_id = excluded.seller_id,
                seller_name = excluded.seller_name,
                seller_phone = excluded.seller_phone,
                seller_phone_alt = excluded.seller_phone_alt,
                seller_when_to_call = excluded.seller_when_to_call,
                seller_type = excluded.seller_type,
                publish_date = excluded.publish_date,
                updated_at = excluded.updated_at
            "#
    );

    let mut stmt = conn.prepare_cached(&sql).context("Failed to prepare upsert")?;

    for offer in offers {
        let d = &offer.details;
        stmt.execute(params![
            offer.id,
            offer.partition,
            offer.state.as_str(),
            offer.price,
            offer.url,
            d.title,
            d.property_type,
            d.category,
            d.num_bedrooms,
            d.num_bathrooms,
            d.floor_area,
            d.ber_rating,
            serde_json::to_string(&d.sections)?,
            serde_json::to_string(&d.images)?,
            d.latitude,
            d.longitude,
            d.seller.id,
            d.seller.name,
            d.seller.phone,
            d.seller.phone_alt,
            d.seller.when_to_call,
            d.seller.seller_type,
            d.publish_date.map(|t| t.to_rfc3339()),
            offer.first_seen_at.to_rfc3339(),
            offer.updated_at.to_rfc3339(),
        ])
        .with_context(|| format!("Failed to upsert offer {}", offer.id))?;
    }

    Ok(offers.len())
}

fn mark_paused_with(conn: &Connection, ids: &[OfferId]) -> Result<usize> {
    const CHUNK_SIZE: usize = 500;
    let now = Utc::now().to_rfc3339();
    let mut changed = 0;

    for chunk in ids.chunks(CHUNK_SIZE) {
        let placeholders: String = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "UPDATE offers SET state = 'PAUSED', updated_at = ? \
             WHERE state = 'PUBLISHED' AND id IN ({placeholders})"
        );

        let mut values = Vec::with_capacity(chunk.len() + 1);
        values.push(Value::Text(now.clone()));
        values.extend(chunk.iter().map(|id| Value::Integer(*id)));

        changed += conn
            .execute(&sql, params_from_iter(values))
            .context("Failed to mark offers paused")?;
    }

    Ok(changed)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn row_to_offer(row: &Row<'_>) -> rusqlite::Result<Offer> {
    let state: String = row.get(2)?;
    let state = state.parse::<OfferState>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;

    let sections: String = row.get(12)?;
    let images: String = row.get(13)?;
    let publish_date: Option<String> = row.get(22)?;
    let first_seen_at: String = row.get(23)?;
    let updated_at: String = row.get(24)?;

    Ok(Offer {
        id: row.get(0)?,
        partition: row.get(1)?,
        state,
        price: row.get(3)?,
        url: row.get(4)?,
        details: ListingDetails {
            title: row.get(5)?,
            property_type: row.get(6)?,
            category: row.get(7)?,
            num_bedrooms: row.get(8)?,
            num_bathrooms: row.get(9)?,
            floor_area: row.get(10)?,
            ber_rating: row.get(11)?,
            sections: serde_json::from_str(&sections).unwrap_or_default(),
            images: serde_json::from_str(&images).unwrap_or_default(),
            latitude: row.get(14)?,
            longitude: row.get(15)?,
            seller: Seller {
                id: row.get(16)?,
                name: row.get(17)?,
                phone: row.get(18)?,
                phone_alt: row.get(19)?,
                when_to_call: row.get(20)?,
                seller_type: row.get(21)?,
            },
            publish_date: publish_date.as_deref().and_then(parse_timestamp),
        },
        first_seen_at: parse_timestamp(&first_seen_at).unwrap_or_else(Utc::now),
        updated_at: parse_timestamp(&updated_at).unwrap_or_else(Utc::now),
    })
}

impl OfferRepository for SqliteOfferRepository {
    fn published_prices(&self, partition: &str) -> Result<HashMap<OfferId, i64>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, price FROM offers WHERE partition = ?1 AND state = 'PUBLISHED'",
            )
            .context("Failed to prepare published price query")?;

        let prices = stmt
            .query_map(params![partition], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()
            .context("Failed to read published prices")?;

        Ok(prices)
    }

    fn has_any_published(&self, partition: &str) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM offers WHERE partition = ?1 AND state = 'PUBLISHED')",
                params![partition],
                |row| row.get(0),
            )
            .context("Failed to check published offers")?;

        Ok(exists)
    }

    fn published_owners(&self, ids: &[OfferId]) -> Result<HashMap<OfferId, String>> {
        const CHUNK_SIZE: usize = 500;
        let conn = self.conn()?;
        let mut owners = HashMap::new();

        for chunk in ids.chunks(CHUNK_SIZE) {
            let placeholders: String = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!(
                "SELECT id, partition FROM offers \
                 WHERE state = 'PUBLISHED' AND id IN ({placeholders})"
            );
            let mut stmt = conn
                .prepare(&sql)
                .context("Failed to prepare owner query")?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to read offer owners")?;
            owners.extend(rows);
        }

        Ok(owners)
    }

    fn upsert_offers(&self, offers: &[Offer]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let count = upsert_with(&tx, offers)?;
        tx.commit().context("Failed to commit upsert")?;
        Ok(count)
    }

    fn mark_paused(&self, ids: &[OfferId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let changed = mark_paused_with(&tx, ids)?;
        tx.commit().context("Failed to commit pause")?;
        Ok(changed)
    }

    fn apply_partition(&self, offers: &[Offer], withdrawn: &[OfferId]) -> Result<PersistSummary> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let upserted = upsert_with(&tx, offers)?;
        let paused = mark_paused_with(&tx, withdrawn)?;

        tx.commit().context("Failed to commit partition persist")?;

        Ok(PersistSummary { upserted, paused })
    }

    fn get_offer(&self, id: OfferId) -> Result<Option<Offer>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {OFFER_COLUMNS} FROM offers WHERE id = ?1");
        let offer = conn
            .query_row(&sql, params![id], row_to_offer)
            .optional()
            .context("Failed to get offer")?;

        Ok(offer)
    }

    fn list_offers(&self, filter: &OfferFilter) -> Result<Vec<Offer>> {
        let conn = self.conn()?;

        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(partition) = &filter.partition {
            clauses.push("partition = ?");
            values.push(Value::Text(partition.clone()));
        }
        if let Some(state) = filter.state {
            clauses.push("state = ?");
            values.push(Value::Text(state.as_str().to_string()));
        }

        let mut sql = format!("SELECT {OFFER_COLUMNS} FROM offers");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY updated_at DESC, id ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = conn.prepare(&sql).context("Failed to prepare offer listing")?;
        let offers = stmt
            .query_map(params_from_iter(values), row_to_offer)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list offers")?;

        Ok(offers)
    }

    fn stats(&self) -> Result<OfferStats> {
        let conn = self.conn()?;
        let (total, published): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(state = 'PUBLISHED'), 0) FROM offers",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(OfferStats {
            total: total as usize,
            published: published as usize,
            paused: (total - published) as usize,
        })
    }
}

// ============================================================================
// Mock Implementation (for testing)
// ============================================================================

/// In-memory implementation of OfferRepository
///
/// Useful for tests and `--dry-run` sweeps without a database file.
#[derive(Default)]
pub struct MockOfferRepository {
    offers: RwLock<BTreeMap<OfferId, Offer>>,
}

impl MockOfferRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the repository with existing offers
    pub fn with_offers(offers: impl IntoIterator<Item = Offer>) -> Self {
        let repo = Self::new();
        if let Ok(mut map) = repo.offers.write() {
            map.extend(offers.into_iter().map(|o| (o.id, o)));
        }
        repo
    }

    pub fn len(&self) -> usize {
        self.offers.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<OfferId, Offer>>> {
        self.offers.read().map_err(|_| anyhow!("offer map lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<OfferId, Offer>>> {
        self.offers.write().map_err(|_| anyhow!("offer map lock poisoned"))
    }
}

fn upsert_into(map: &mut BTreeMap<OfferId, Offer>, offers: &[Offer]) -> usize {
    for offer in offers {
        let mut offer = offer.clone();
        if let Some(existing) = map.get(&offer.id) {
            offer.first_seen_at = existing.first_seen_at;
        }
        map.insert(offer.id, offer);
    }
    offers.len()
}

fn pause_in(map: &mut BTreeMap<OfferId, Offer>, ids: &[OfferId]) -> usize {
    let now = Utc::now();
    let mut changed = 0;
    for id in ids {
        if let Some(offer) = map.get_mut(id) {
            if offer.state == OfferState::Published {
                offer.state = OfferState::Paused;
                offer.updated_at = now;
                changed += 1;
            }
        }
    }
    changed
}

impl OfferRepository for MockOfferRepository {
    fn published_prices(&self, partition: &str) -> Result<HashMap<OfferId, i64>> {
        Ok(self
            .read()?
            .values()
            .filter(|o| o.partition == partition && o.is_published())
            .map(|o| (o.id, o.price))
            .collect())
    }

    fn has_any_published(&self, partition: &str) -> Result<bool> {
        Ok(self
            .read()?
            .values()
            .any(|o| o.partition == partition && o.is_published()))
    }

    fn published_owners(&self, ids: &[OfferId]) -> Result<HashMap<OfferId, String>> {
        let map = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| map.get(id))
            .filter(|o| o.is_published())
            .map(|o| (o.id, o.partition.clone()))
            .collect())
    }

    fn upsert_offers(&self, offers: &[Offer]) -> Result<usize> {
        Ok(upsert_into(&mut *self.write()?, offers))
    }

    fn mark_paused(&self, ids: &[OfferId]) -> Result<usize> {
        Ok(pause_in(&mut *self.write()?, ids))
    }

    fn apply_partition(&self, offers: &[Offer], withdrawn: &[OfferId]) -> Result<PersistSummary> {
        let mut map = self.write()?;
        let upserted = upsert_into(&mut map, offers);
        let paused = pause_in(&mut map, withdrawn);
        Ok(PersistSummary { upserted, paused })
    }

    fn get_offer(&self, id: OfferId) -> Result<Option<Offer>> {
        Ok(self.read()?.get(&id).cloned())
    }

    fn list_offers(&self, filter: &OfferFilter) -> Result<Vec<Offer>> {
        let mut offers: Vec<Offer> = self
            .read()?
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        offers.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            offers.truncate(limit);
        }
        Ok(offers)
    }

    fn stats(&self) -> Result<OfferStats> {
        let map = self.read()?;
        let published = map.values().filter(|o| o.is_published()).count();
        Ok(OfferStats {
            total: map.len(),
            published,
            paused: map.len() - published,
        })
    }
}

// ============================================================================
// Shared Repository Types
// ============================================================================

/// Thread-safe shared repository wrapper
pub type SharedOfferRepository = Arc<dyn OfferRepository>;

/// Create a shared SQLite repository
pub fn create_sqlite_repository(path: impl AsRef<Path>) -> Result<SharedOfferRepository> {
    Ok(Arc::new(SqliteOfferRepository::new(path)?))
}

/// Create a shared in-memory repository
pub fn create_mock_repository() -> SharedOfferRepository {
    Arc::new(MockOfferRepository::new())
}

// ============================================================================
// Tests
// ============================================================================
