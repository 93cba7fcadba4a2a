//! # Storefront payment server
//! This crate hosts the HTTP server in front of the payment reconciliation engine. It is responsible for:
//! Listening for webhook requests from the payment provider.
//! Verifying their signatures and decoding them into payment events.
//! Handing the events to the engine, and acknowledging them so that the provider keeps delivering.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/webhook/payments`: The payment provider's webhook.
//! * `/admin/returns/{return_id}/label`: Re-drives label generation for a return. Requires the admin API key.
//! * `/admin/settings/{key}`: Updates a store setting. Requires the admin API key.

pub mod acknowledgment;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
