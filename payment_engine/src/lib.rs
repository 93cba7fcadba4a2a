//! Storefront Payment Engine
//!
//! The payment engine reconciles asynchronous payment provider events with the storefront's orders and return
//! requests. It is provider-agnostic: the server verifies and translates provider payloads into
//! [`PaymentEvent`]s and hands them to the [`ReconciliationApi`].
//!
//! The library is divided into these sections:
//! 1. Storage ([`mod@traits`] and the SQLite backend). The traits describe what the engine needs from a backend;
//!    every state change is a guarded, conditional update so that concurrent and repeated deliveries of an event
//!    cannot apply it twice. The data types used in the database are defined in [`mod@db_types`] and are public.
//! 2. The public API ([`mod@spe_api`]): correlation, reconciliation, inventory adjustment and the settings cache.
//! 3. Outbound notifications ([`mod@notifications`]): traits for the email and label services and a dispatcher that
//!    isolates every call behind a timeout and a panic guard.
pub mod db_types;
pub mod notifications;
pub mod spe_api;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use notifications::{
    panic_message,
    DispatchContext,
    EmailKind,
    EmailReceipt,
    EmailSender,
    LabelGenerator,
    NotificationDispatcher,
    NotificationError,
};
#[cfg(feature = "sqlite")]
pub use sqlite::{db as sqlite_db, SqliteDatabase};
pub use spe_api::{
    correlation_api::{Correlated, CorrelationApi, CorrelationTier, RefundTarget},
    errors::ReconciliationError,
    event_objects::{CorrelationMetadata, PaymentDetails, PaymentEvent, PaymentEventKind, RefundDetails},
    inventory_api::{InventoryApi, InventoryReport, StockAdjustment},
    reconciliation_api::ReconciliationApi,
    reconciliation_objects::{LabelAttempt, LabelOutcome, Outcome, ReconciliationOptions, ReconciliationReport},
    settings_api::SettingsCache,
};
pub use traits::{
    EventLedger,
    InventoryManagement,
    NewProcessedEvent,
    OrderManagement,
    OrderTransition,
    ReconciliationDatabase,
    ReturnManagement,
    ReturnTransition,
    SettingsManagement,
    StoreError,
};
