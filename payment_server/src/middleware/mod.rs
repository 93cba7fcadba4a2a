mod admin;

pub use admin::{check_api_key, AdminKeyMiddlewareFactory, AdminKeyMiddlewareService};
