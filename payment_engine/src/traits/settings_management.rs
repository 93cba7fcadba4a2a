use crate::traits::StoreError;

#[allow(async_fn_in_trait)]
pub trait SettingsManagement {
    async fn fetch_setting(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn upsert_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;
}
