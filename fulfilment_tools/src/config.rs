use std::{env, time::Duration};

use log::*;
use serde::Serialize;
use storefront_common::{helpers::env_duration_secs, Secret};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct FulfilmentConfig {
    /// Base URL of the transactional email service, e.g. `https://mail.example.com/v1`
    pub email_api_url: String,
    pub email_api_key: Secret<String>,
    /// The `From` address used for every email we send.
    pub email_from: String,
    /// Base URL of the courier integration, e.g. `https://labels.example.com/api/v2`
    pub label_api_url: String,
    pub label_api_key: Secret<String>,
    pub label_api_secret: Secret<String>,
    /// Where returned parcels are shipped to.
    pub return_address: ReturnAddress,
    /// Upper bound for any single outbound request.
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReturnAddress {
    pub name: String,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl Default for FulfilmentConfig {
    fn default() -> Self {
        Self {
            email_api_url: "http://localhost:8025".to_string(),
            email_api_key: Secret::default(),
            email_from: "orders@example.com".to_string(),
            label_api_url: "http://localhost:8026".to_string(),
            label_api_key: Secret::default(),
            label_api_secret: Secret::default(),
            return_address: ReturnAddress::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl FulfilmentConfig {
    pub fn new_from_env_or_default() -> Self {
        let defaults = Self::default();
        let email_api_url = env::var("SPG_EMAIL_API_URL").unwrap_or_else(|_| {
            warn!("🪛️ SPG_EMAIL_API_URL not set, using (probably useless) default {}", defaults.email_api_url);
            defaults.email_api_url.clone()
        });
        let email_api_key = Secret::new(env::var("SPG_EMAIL_API_KEY").unwrap_or_else(|_| {
            warn!("🪛️ SPG_EMAIL_API_KEY not set. Emails will most likely be rejected.");
            String::default()
        }));
        let email_from = env::var("SPG_EMAIL_FROM").unwrap_or_else(|_| {
            warn!("🪛️ SPG_EMAIL_FROM not set, using {}", defaults.email_from);
            defaults.email_from.clone()
        });
        let label_api_url = env::var("SPG_LABEL_API_URL").unwrap_or_else(|_| {
            warn!("🪛️ SPG_LABEL_API_URL not set, using (probably useless) default {}", defaults.label_api_url);
            defaults.label_api_url.clone()
        });
        let label_api_key = Secret::new(env::var("SPG_LABEL_API_KEY").unwrap_or_default());
        let label_api_secret = Secret::new(env::var("SPG_LABEL_API_SECRET").unwrap_or_default());
        if label_api_key.is_empty() || label_api_secret.is_empty() {
            warn!("🪛️ SPG_LABEL_API_KEY or SPG_LABEL_API_SECRET is not set. Return labels cannot be generated.");
        }
        let return_address = ReturnAddress {
            name: env::var("SPG_RETURN_ADDRESS_NAME").unwrap_or_default(),
            street: env::var("SPG_RETURN_ADDRESS_STREET").unwrap_or_default(),
            city: env::var("SPG_RETURN_ADDRESS_CITY").unwrap_or_default(),
            postal_code: env::var("SPG_RETURN_ADDRESS_POSTAL_CODE").unwrap_or_default(),
            country: env::var("SPG_RETURN_ADDRESS_COUNTRY").unwrap_or_default(),
        };
        let request_timeout = env_duration_secs("SPG_NOTIFICATION_TIMEOUT_SECS")
            .unwrap_or_else(|s| {
                warn!("🪛️ Invalid value for SPG_NOTIFICATION_TIMEOUT_SECS: {s}. Using the default.");
                None
            })
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        Self {
            email_api_url,
            email_api_key,
            email_from,
            label_api_url,
            label_api_key,
            label_api_secret,
            return_address,
            request_timeout,
        }
    }
}
