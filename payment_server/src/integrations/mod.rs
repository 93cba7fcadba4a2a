//! Adapters between the outside world and the reconciliation engine: the payment provider's webhooks on the way in,
//! and the email and courier services on the way out.
pub mod fulfilment;
pub mod stripe;
