//! # Storefront payment engine public API
//!
//! The `spe_api` module exposes the programmatic API for reconciling payment provider events against the storefront's
//! orders and return requests.
//!
//! * [`reconciliation_api`] is the entry point. It takes a verified [`PaymentEvent`](event_objects::PaymentEvent),
//!   applies it to the matching aggregate and runs the follow-up side effects.
//! * [`correlation_api`] finds the order or return request that an event belongs to, using a tiered lookup.
//! * [`inventory_api`] adjusts stock counters after a sale or a refunded return.
//! * [`settings_api`] is a short-lived cache over the shop-wide settings.
//!
//! The other submodules hold the value types passed in and out of these APIs.
//!
//! # API usage
//!
//! Every API is created by supplying a database backend that implements the backend traits it needs. The
//! reconciliation API additionally takes the email and label collaborators.
//!
//! ```rust,ignore
//! use payment_engine::{ReconciliationApi, ReconciliationOptions, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = ReconciliationApi::new(db, emailer, labeler, ReconciliationOptions::default());
//! let report = api.reconcile(&event).await;
//! ```

pub mod correlation_api;
pub mod errors;
pub mod event_objects;
pub mod inventory_api;
pub mod reconciliation_api;
pub mod reconciliation_objects;
pub mod settings_api;
