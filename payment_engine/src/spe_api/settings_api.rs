use std::{
    collections::HashMap,
    fmt::Debug,
    time::{Duration, Instant},
};

use log::*;
use tokio::sync::RwLock;

use crate::traits::{SettingsManagement, StoreError};

pub const STORE_NAME: &str = "store_name";
pub const SUPPORT_EMAIL: &str = "support_email";
pub const LOW_STOCK_THRESHOLD: &str = "low_stock_threshold";

const DEFAULT_STORE_NAME: &str = "Storefront";
const DEFAULT_SUPPORT_EMAIL: &str = "support@example.com";
const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;

struct CachedSetting {
    value: Option<String>,
    fetched_at: Instant,
}

/// A read-through cache over the `store_settings` table.
///
/// Entries are served from memory until they are older than the staleness window, after which the next read goes to
/// the store again. Writes through [`SettingsCache::set`] invalidate the entry immediately. The lock is never held
/// while the store is being queried.
pub struct SettingsCache<B> {
    db: B,
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedSetting>>,
}

impl<B> Debug for SettingsCache<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettingsCache (ttl: {:?})", self.ttl)
    }
}

impl<B> SettingsCache<B> {
    pub fn new(db: B, ttl: Duration) -> Self {
        Self { db, ttl, entries: RwLock::new(HashMap::new()) }
    }

    /// Drops the cached value for `key`, so that the next read goes to the store.
    pub async fn invalidate(&self, key: &str) {
        if self.entries.write().await.remove(key).is_some() {
            trace!("🗃️ Setting '{key}' invalidated");
        }
    }
}

impl<B> SettingsCache<B>
where B: SettingsManagement
{
    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(key) {
                if entry.fetched_at.elapsed() < self.ttl {
                    return Ok(entry.value.clone());
                }
            }
        }
        let value = self.db.fetch_setting(key).await?;
        trace!("🗃️ Setting '{key}' loaded from the store");
        let entry = CachedSetting { value: value.clone(), fetched_at: Instant::now() };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(value)
    }

    /// Writes the setting to the store, then invalidates the cached entry.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.db.upsert_setting(key, value).await?;
        self.invalidate(key).await;
        info!("🗃️ Setting '{key}' updated");
        Ok(())
    }

    /// Like [`Self::get`], but falls back to `default` when the setting is missing or cannot be read.
    pub async fn get_or(&self, key: &str, default: &str) -> String {
        match self.get(key).await {
            Ok(Some(v)) => v,
            Ok(None) => default.to_string(),
            Err(e) => {
                warn!("🗃️ Could not read setting '{key}'. Using '{default}'. {e}");
                default.to_string()
            },
        }
    }

    pub async fn store_name(&self) -> String {
        self.get_or(STORE_NAME, DEFAULT_STORE_NAME).await
    }

    pub async fn support_email(&self) -> String {
        self.get_or(SUPPORT_EMAIL, DEFAULT_SUPPORT_EMAIL).await
    }

    pub async fn low_stock_threshold(&self) -> i64 {
        let value = self.get_or(LOW_STOCK_THRESHOLD, "").await;
        value.trim().parse().unwrap_or_else(|_| {
            if !value.is_empty() {
                warn!("🗃️ '{value}' is not a valid low stock threshold. Using {DEFAULT_LOW_STOCK_THRESHOLD}");
            }
            DEFAULT_LOW_STOCK_THRESHOLD
        })
    }
}
