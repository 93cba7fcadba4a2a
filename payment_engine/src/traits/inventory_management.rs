use crate::{
    db_types::{StockPool, VariantId, VariantStock},
    traits::StoreError,
};

/// Per-variant stock counters. Counters never go below zero, and every mutation is a single atomic statement.
#[allow(async_fn_in_trait)]
pub trait InventoryManagement {
    async fn fetch_variant_stock(&self, variant_id: &VariantId) -> Result<Option<VariantStock>, StoreError>;

    /// Sets both counters for a variant, creating the variant if it does not exist yet.
    async fn upsert_variant_stock(
        &self,
        variant_id: &VariantId,
        stock_quantity: i64,
        presale_stock_quantity: i64,
    ) -> Result<VariantStock, StoreError>;

    /// Decrements the given pool by `quantity`, flooring at zero. Returns the new level, or `None` if the variant is
    /// unknown.
    async fn decrement_stock(
        &self,
        variant_id: &VariantId,
        quantity: i64,
        pool: StockPool,
    ) -> Result<Option<i64>, StoreError>;

    /// Adds `quantity` back to the regular pool. Returns the new level, or `None` if the variant is unknown.
    async fn increment_stock(&self, variant_id: &VariantId, quantity: i64) -> Result<Option<i64>, StoreError>;
}
