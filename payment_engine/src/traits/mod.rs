//! #  Storage backends
//!
//! This module defines the interface contracts that a storage backend must honour to be used by the reconciliation
//! engine. Backends (currently only [`crate::SqliteDatabase`]) implement these traits; the engine never talks to a
//! database directly.
//!
//! * [`ReconciliationDatabase`] is the highest level of behaviour. It holds the guarded state transitions for orders
//!   and return requests. Every transition is a single conditional update, so when several deliveries of the same
//!   event race, exactly one of them wins.
//! * [`OrderManagement`] and [`ReturnManagement`] provide the lookups used by the correlation resolver.
//! * [`InventoryManagement`] provides atomic stock counter updates.
//! * [`EventLedger`] records which provider events have been reconciled, so redeliveries can be recognised.
//! * [`SettingsManagement`] stores the shop-wide key/value settings.
mod data_objects;
mod event_ledger;
mod inventory_management;
mod order_management;
mod reconciliation_database;
mod return_management;
mod settings_management;

pub use data_objects::{NewProcessedEvent, OrderTransition, ReturnTransition};
pub use event_ledger::EventLedger;
pub use inventory_management::InventoryManagement;
pub use order_management::OrderManagement;
pub use reconciliation_database::{ReconciliationDatabase, StoreError};
pub use return_management::ReturnManagement;
pub use settings_management::SettingsManagement;
