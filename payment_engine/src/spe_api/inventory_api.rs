use std::fmt::Debug;

use log::*;
use serde::Serialize;

use crate::{
    db_types::{OrderItem, ReturnItem, StockPool, VariantId},
    traits::InventoryManagement,
};

/// The result of adjusting a single variant's stock counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockAdjustment {
    pub variant_id: VariantId,
    pub pool: StockPool,
    /// Signed change that was requested: negative for sales, positive for restocks
    pub change: i64,
    pub new_level: Option<i64>,
    pub error: Option<String>,
}

impl StockAdjustment {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.new_level.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InventoryReport {
    pub adjustments: Vec<StockAdjustment>,
}

impl InventoryReport {
    /// Diagnostics for every adjustment that did not go through
    pub fn warnings(&self) -> Vec<String> {
        self.adjustments
            .iter()
            .filter_map(|a| {
                let reason = match (&a.error, a.new_level) {
                    (Some(e), _) => e.as_str(),
                    (None, None) => "unknown variant",
                    _ => return None,
                };
                Some(format!("stock for variant {} ({}) not adjusted: {reason}", a.variant_id, a.pool))
            })
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.adjustments.iter().all(StockAdjustment::succeeded)
    }
}

/// `InventoryApi` applies the stock effects of sales and returns. Every item is adjusted independently: a failure on
/// one item is recorded in the report and the remaining items are still processed.
pub struct InventoryApi<B> {
    db: B,
}

impl<B> Debug for InventoryApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InventoryApi")
    }
}

impl<B> InventoryApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> InventoryApi<B>
where B: InventoryManagement
{
    /// Takes the sold quantities out of stock, drawing each line item from the pool given by its presale flag.
    pub async fn apply_sale(&self, items: &[OrderItem], low_stock_threshold: i64) -> InventoryReport {
        let mut report = InventoryReport::default();
        for item in items {
            let pool = item.stock_pool();
            let result = self.db.decrement_stock(&item.variant_id, item.quantity, pool).await;
            let adjustment = self.record(&item.variant_id, pool, -item.quantity, result, low_stock_threshold);
            report.adjustments.push(adjustment);
        }
        report
    }

    /// Puts returned quantities back into the regular pool.
    pub async fn restock(&self, items: &[ReturnItem]) -> InventoryReport {
        let mut report = InventoryReport::default();
        for item in items {
            let result = self.db.increment_stock(&item.variant_id, item.quantity).await;
            let adjustment = self.record(&item.variant_id, StockPool::Regular, item.quantity, result, i64::MIN);
            report.adjustments.push(adjustment);
        }
        report
    }

    fn record<E: std::fmt::Display>(
        &self,
        variant_id: &VariantId,
        pool: StockPool,
        change: i64,
        result: Result<Option<i64>, E>,
        low_stock_threshold: i64,
    ) -> StockAdjustment {
        let mut adjustment =
            StockAdjustment { variant_id: variant_id.clone(), pool, change, new_level: None, error: None };
        match result {
            Ok(Some(level)) => {
                debug!("📦️ Stock for variant {variant_id} ({pool}) changed by {change}. New level: {level}");
                if level <= low_stock_threshold {
                    warn!("📦️ Variant {variant_id} is running low on {pool} stock. Only {level} left.");
                }
                adjustment.new_level = Some(level);
            },
            Ok(None) => {
                warn!("📦️ Variant {variant_id} has no stock record. {pool} stock change of {change} was not applied.");
            },
            Err(e) => {
                error!("📦️ Could not change {pool} stock for variant {variant_id} by {change}. {e}");
                adjustment.error = Some(e.to_string());
            },
        }
        adjustment
    }
}

#[cfg(test)]
mod test {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use super::*;
    use crate::{
        db_types::{Cents, OrderId, ReturnId, VariantStock},
        traits::StoreError,
    };

    #[derive(Clone, Default)]
    struct MemoryStock {
        levels: Arc<Mutex<HashMap<String, (i64, i64)>>>,
        broken: Option<String>,
    }

    impl InventoryManagement for MemoryStock {
        async fn fetch_variant_stock(&self, _variant_id: &VariantId) -> Result<Option<VariantStock>, StoreError> {
            unimplemented!()
        }

        async fn upsert_variant_stock(&self, _: &VariantId, _: i64, _: i64) -> Result<VariantStock, StoreError> {
            unimplemented!()
        }

        async fn decrement_stock(
            &self,
            variant_id: &VariantId,
            quantity: i64,
            pool: StockPool,
        ) -> Result<Option<i64>, StoreError> {
            if self.broken.as_deref() == Some(variant_id.as_str()) {
                return Err(StoreError::DatabaseError("disk full".into()));
            }
            let mut levels = self.levels.lock().unwrap();
            Ok(levels.get_mut(variant_id.as_str()).map(|(regular, presale)| {
                let level = if pool == StockPool::Regular { regular } else { presale };
                *level = (*level - quantity).max(0);
                *level
            }))
        }

        async fn increment_stock(&self, variant_id: &VariantId, quantity: i64) -> Result<Option<i64>, StoreError> {
            let mut levels = self.levels.lock().unwrap();
            Ok(levels.get_mut(variant_id.as_str()).map(|(regular, _)| {
                *regular += quantity;
                *regular
            }))
        }
    }

    fn item(variant: &str, quantity: i64, presale: bool) -> OrderItem {
        OrderItem {
            id: 0,
            order_id: OrderId::from("1001"),
            variant_id: VariantId::from(variant),
            quantity,
            unit_price: Cents::from(1000),
            presale,
        }
    }

    #[tokio::test]
    async fn failures_do_not_abort_remaining_items() {
        let db = MemoryStock { broken: Some("v-broken".into()), ..Default::default() };
        db.levels.lock().unwrap().insert("v-1".into(), (10, 3));
        db.levels.lock().unwrap().insert("v-2".into(), (1, 0));
        let api = InventoryApi::new(db.clone());
        let items =
            vec![item("v-broken", 1, false), item("v-unknown", 1, false), item("v-1", 2, true), item("v-2", 4, false)];
        let report = api.apply_sale(&items, 0).await;
        assert_eq!(report.adjustments.len(), 4);
        assert!(!report.all_succeeded());
        assert_eq!(report.warnings().len(), 2);
        assert_eq!(report.adjustments[2].new_level, Some(1));
        assert_eq!(report.adjustments[3].new_level, Some(0));
        assert_eq!(db.levels.lock().unwrap()["v-1"], (10, 1));
    }

    #[tokio::test]
    async fn restock_adds_to_regular_pool() {
        let db = MemoryStock::default();
        db.levels.lock().unwrap().insert("v-1".into(), (0, 7));
        let api = InventoryApi::new(db.clone());
        let items = vec![ReturnItem {
            id: 1,
            return_id: ReturnId::from("r-1"),
            variant_id: VariantId::from("v-1"),
            quantity: 2,
        }];
        let report = api.restock(&items).await;
        assert!(report.all_succeeded());
        assert_eq!(db.levels.lock().unwrap()["v-1"], (2, 7));
    }
}
